// Entity Models
// The three records the API manages, with their wire-code enums.

pub mod department;
pub mod event;
pub mod sensor;

pub use department::Departamento;
pub use event::{Evento, TipoEvento};
pub use sensor::{Estado, Sensor};
