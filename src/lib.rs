// SmartConnect - Core Library
// Validation and authorization rule engine for the IoT access-control API.
// The HTTP layer (bin/server.rs) only wires these pieces together:
// authorize → field validators → cross-field rules → store, with every
// failure normalized by errors.rs.

pub mod auth;
pub mod db;
pub mod entities;
pub mod errors;
pub mod rules;
pub mod schema;
pub mod validators;

// Re-export commonly used types
pub use auth::{authorize, Access, Caller, Resource, Role};
pub use db::{setup_database, CascadeRule, OnDelete};
pub use entities::{Departamento, Estado, Evento, Sensor, TipoEvento};
pub use errors::{ApiError, ErrorPayload, FieldErrors, ValidationError};
pub use rules::{check_evento_rules, check_sensor_rules};
pub use schema::{EntitySchema, FieldKind, FieldSpec, Writability};
pub use validators::{
    validate_departamento, validate_evento, validate_sensor, DepartamentoDraft, DepartamentoInput,
    EventoDraft, EventoInput, SensorDraft, SensorInput,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
