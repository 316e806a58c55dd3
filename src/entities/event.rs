// Evento Entity
// An access event recorded by a sensor. Events are created by the domain
// and only destroyed as a cascade of their sensor's deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// TIPO DE EVENTO
// ============================================================================

/// Kind of access event, with the stable Spanish wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipoEvento {
    Entrada,
    Salida,
    Denegado,
    Error,
}

impl TipoEvento {
    pub const CODES: [&'static str; 4] = ["entrada", "salida", "denegado", "error"];

    pub fn as_str(&self) -> &'static str {
        match self {
            TipoEvento::Entrada => "entrada",
            TipoEvento::Salida => "salida",
            TipoEvento::Denegado => "denegado",
            TipoEvento::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<TipoEvento> {
        match raw {
            "entrada" => Some(TipoEvento::Entrada),
            "salida" => Some(TipoEvento::Salida),
            "denegado" => Some(TipoEvento::Denegado),
            "error" => Some(TipoEvento::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for TipoEvento {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EVENTO
// ============================================================================

/// Persisted event record. `fecha_registro` is system-assigned at creation
/// and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evento {
    pub id: i64,
    pub sensor: i64,
    pub tipo: TipoEvento,
    pub descripcion: String,
    pub fecha_registro: DateTime<Utc>,
}
