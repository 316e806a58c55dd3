// Sensor Entity
// An access-control reader identified by its MAC address, optionally
// assigned to a department. The estado/departamento coupling is enforced
// by the cross-field rules in rules.rs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ESTADO
// ============================================================================

/// Operational state of a sensor. The wire codes are the stable Spanish
/// strings of the API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Estado {
    Activo,
    Inactivo,
    Bloqueado,
    Perdido,
}

impl Estado {
    /// All accepted wire codes, in declaration order.
    pub const CODES: [&'static str; 4] = ["activo", "inactivo", "bloqueado", "perdido"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Estado::Activo => "activo",
            Estado::Inactivo => "inactivo",
            Estado::Bloqueado => "bloqueado",
            Estado::Perdido => "perdido",
        }
    }

    pub fn parse(raw: &str) -> Option<Estado> {
        match raw {
            "activo" => Some(Estado::Activo),
            "inactivo" => Some(Estado::Inactivo),
            "bloqueado" => Some(Estado::Bloqueado),
            "perdido" => Some(Estado::Perdido),
            _ => None,
        }
    }

    /// Blocked and lost sensors may not record events.
    pub fn admits_eventos(&self) -> bool {
        !matches!(self, Estado::Bloqueado | Estado::Perdido)
    }
}

impl Default for Estado {
    /// New sensors start inactive.
    fn default() -> Self {
        Estado::Inactivo
    }
}

impl std::fmt::Display for Estado {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SENSOR
// ============================================================================

/// Persisted sensor record. `mac_address` is stored uppercased and is
/// globally unique; `departamento` is a nullable reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub id: i64,
    pub mac_address: String,
    pub modelo: String,
    pub estado: Estado,
    pub departamento: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estado_round_trips_wire_codes() {
        for code in Estado::CODES {
            let estado = Estado::parse(code).unwrap();
            assert_eq!(estado.as_str(), code);
        }
    }

    #[test]
    fn test_estado_rejects_unknown_codes() {
        assert!(Estado::parse("encendido").is_none());
        assert!(Estado::parse("ACTIVO").is_none());
        assert!(Estado::parse("").is_none());
    }

    #[test]
    fn test_estado_default_is_inactivo() {
        assert_eq!(Estado::default(), Estado::Inactivo);
    }

    #[test]
    fn test_estado_admits_eventos() {
        assert!(Estado::Activo.admits_eventos());
        assert!(Estado::Inactivo.admits_eventos());
        assert!(!Estado::Bloqueado.admits_eventos());
        assert!(!Estado::Perdido.admits_eventos());
    }

    #[test]
    fn test_estado_serde_uses_lowercase_codes() {
        let json = serde_json::to_string(&Estado::Bloqueado).unwrap();
        assert_eq!(json, "\"bloqueado\"");

        let parsed: Estado = serde_json::from_str("\"perdido\"").unwrap();
        assert_eq!(parsed, Estado::Perdido);
    }
}
