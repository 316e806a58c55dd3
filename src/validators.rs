// Field Validators
// Per-field syntactic/semantic checks. Each validator takes one proposed
// value and returns the normalized value or a ValidationError keyed to the
// field. The assembly functions below run every independent field check,
// accumulate the failures, and only then hand the draft to rules.rs.
//
// All validators are pure; the department-name uniqueness check receives
// the existing name set (already excluding the record being edited) from
// the store instead of querying it itself.

use crate::entities::{Departamento, Estado, Evento, Sensor, TipoEvento};
use crate::errors::{ApiError, FieldErrors, ValidationError};
use serde::{Deserialize, Deserializer};

/// Characters never allowed in a sensor model name.
const MODELO_FORBIDDEN: [char; 6] = ['<', '>', '$', '{', '}', ';'];

// ============================================================================
// PER-FIELD VALIDATORS
// ============================================================================

/// Department name: trimmed, ≥ 3 chars, restricted character set, unique
/// among `existentes` case-insensitively. Returns the trimmed value.
pub fn validate_nombre(raw: &str, existentes: &[String]) -> Result<String, ValidationError> {
    let nombre = raw.trim();

    if nombre.chars().count() < 3 {
        return Err(ValidationError::new(
            "nombre",
            "El nombre del departamento debe tener al menos 3 caracteres.",
        ));
    }

    let permitido =
        |c: char| c.is_alphabetic() || c.is_ascii_digit() || matches!(c, ' ' | '-' | '.');
    if !nombre.chars().all(permitido) {
        return Err(ValidationError::new(
            "nombre",
            "El nombre solo puede contener letras, números, espacios, guiones y puntos.",
        ));
    }

    let folded = nombre.to_lowercase();
    if existentes.iter().any(|n| n.to_lowercase() == folded) {
        return Err(ValidationError::new(
            "nombre",
            "Ya existe un departamento con ese nombre.",
        ));
    }

    Ok(nombre.to_string())
}

/// Department description: optional; blank collapses to None, anything else
/// must be ≥ 5 chars after trimming.
pub fn validate_descripcion(raw: &str) -> Result<Option<String>, ValidationError> {
    let descripcion = raw.trim();

    if descripcion.is_empty() {
        return Ok(None);
    }
    if descripcion.chars().count() < 5 {
        return Err(ValidationError::new(
            "descripcion",
            "La descripción debe tener al menos 5 caracteres.",
        ));
    }

    Ok(Some(descripcion.to_string()))
}

/// MAC address: six colon-separated hex octets, normalized to uppercase.
/// Hyphen separators and any other octet count are rejected.
pub fn validate_mac(raw: &str) -> Result<String, ValidationError> {
    let octetos: Vec<&str> = raw.split(':').collect();
    let valida = octetos.len() == 6
        && octetos
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));

    if !valida {
        return Err(ValidationError::new(
            "mac_address",
            "La dirección MAC no es válida. Use el formato XX:XX:XX:XX:XX:XX",
        ));
    }

    Ok(raw.to_ascii_uppercase())
}

/// Sensor model: trimmed, ≥ 3 chars, none of the forbidden characters.
pub fn validate_modelo(raw: &str) -> Result<String, ValidationError> {
    let modelo = raw.trim();

    if modelo.chars().count() < 3 {
        return Err(ValidationError::new(
            "modelo",
            "El modelo debe tener al menos 3 caracteres.",
        ));
    }
    if modelo.chars().any(|c| MODELO_FORBIDDEN.contains(&c)) {
        return Err(ValidationError::new(
            "modelo",
            "El modelo contiene caracteres no permitidos (< > $ { } ;).",
        ));
    }

    Ok(modelo.to_string())
}

/// Sensor state: one of the four wire codes.
pub fn validate_estado(raw: &str) -> Result<Estado, ValidationError> {
    Estado::parse(raw).ok_or_else(|| {
        ValidationError::new(
            "estado",
            format!("El estado no es válido. Opciones: {:?}", Estado::CODES),
        )
    })
}

/// Event type: one of the four wire codes.
pub fn validate_tipo(raw: &str) -> Result<TipoEvento, ValidationError> {
    TipoEvento::parse(raw).ok_or_else(|| {
        ValidationError::new(
            "tipo",
            format!(
                "El tipo de evento no es válido. Opciones: {:?}",
                TipoEvento::CODES
            ),
        )
    })
}

/// Event description: required, non-empty after trimming.
pub fn validate_evento_descripcion(raw: &str) -> Result<String, ValidationError> {
    let descripcion = raw.trim();

    if descripcion.is_empty() {
        return Err(ValidationError::new(
            "descripcion",
            "La descripción del evento no puede estar vacía.",
        ));
    }

    Ok(descripcion.to_string())
}

// ============================================================================
// CALLER INPUT
// ============================================================================

// Every field is optional so the same shape serves create and partial
// update; the assembly functions decide what "absent" means per operation.

#[derive(Debug, Default, Deserialize)]
pub struct DepartamentoInput {
    pub nombre: Option<String>,
    /// Distinguishes "field absent" (outer None, keep current) from an
    /// explicit `"descripcion": null` (Some(None), clear the description).
    #[serde(default, deserialize_with = "double_option")]
    pub descripcion: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SensorInput {
    pub mac_address: Option<String>,
    pub modelo: Option<String>,
    pub estado: Option<String>,
    /// Distinguishes "field absent" (outer None, keep current) from an
    /// explicit `"departamento": null` (Some(None), clear the reference).
    #[serde(default, deserialize_with = "double_option")]
    pub departamento: Option<Option<i64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventoInput {
    pub sensor: Option<i64>,
    pub tipo: Option<String>,
    pub descripcion: Option<String>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

// ============================================================================
// NORMALIZED DRAFTS
// ============================================================================

// A draft is the merged, field-validated view of a record, ready for the
// cross-field rules and then the store.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartamentoDraft {
    pub nombre: String,
    pub descripcion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDraft {
    pub mac_address: String,
    pub modelo: String,
    pub estado: Estado,
    pub departamento: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventoDraft {
    pub sensor: i64,
    pub tipo: TipoEvento,
    pub descripcion: String,
}

// ============================================================================
// WHOLE-RECORD ASSEMBLY
// ============================================================================

/// Validate a department payload. On update, absent fields fall back to the
/// stored record; `existentes` must already exclude the record being edited.
pub fn validate_departamento(
    input: &DepartamentoInput,
    existing: Option<&Departamento>,
    existentes: &[String],
) -> Result<DepartamentoDraft, ApiError> {
    let mut errors = FieldErrors::new();

    let nombre_raw = input
        .nombre
        .clone()
        .or_else(|| existing.map(|d| d.nombre.clone()));
    let descripcion_raw = match &input.descripcion {
        // Present, possibly an explicit null clearing the stored value.
        Some(valor) => valor.clone(),
        None => existing.and_then(|d| d.descripcion.clone()),
    };

    let nombre = match nombre_raw {
        Some(raw) => match validate_nombre(&raw, existentes) {
            Ok(nombre) => Some(nombre),
            Err(err) => {
                errors.add(err);
                None
            }
        },
        None => {
            errors.add(ValidationError::required("nombre"));
            None
        }
    };

    let descripcion = match descripcion_raw {
        Some(raw) => match validate_descripcion(&raw) {
            Ok(descripcion) => descripcion,
            Err(err) => {
                errors.add(err);
                None
            }
        },
        None => None,
    };

    match (nombre, errors.is_empty()) {
        (Some(nombre), true) => Ok(DepartamentoDraft {
            nombre,
            descripcion,
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

/// Validate a sensor payload against the merged view of changed and
/// unchanged fields. Does not run the estado/departamento rules; that is
/// rules.rs territory, after every field has passed.
pub fn validate_sensor(
    input: &SensorInput,
    existing: Option<&Sensor>,
) -> Result<SensorDraft, ApiError> {
    let mut errors = FieldErrors::new();

    let mac_raw = input
        .mac_address
        .clone()
        .or_else(|| existing.map(|s| s.mac_address.clone()));
    let modelo_raw = input
        .modelo
        .clone()
        .or_else(|| existing.map(|s| s.modelo.clone()));
    let departamento = match input.departamento {
        Some(valor) => valor,
        None => existing.and_then(|s| s.departamento),
    };

    let mac_address = match mac_raw {
        Some(raw) => match validate_mac(&raw) {
            Ok(mac) => Some(mac),
            Err(err) => {
                errors.add(err);
                None
            }
        },
        None => {
            errors.add(ValidationError::required("mac_address"));
            None
        }
    };

    let modelo = match modelo_raw {
        Some(raw) => match validate_modelo(&raw) {
            Ok(modelo) => Some(modelo),
            Err(err) => {
                errors.add(err);
                None
            }
        },
        None => {
            errors.add(ValidationError::required("modelo"));
            None
        }
    };

    let estado = match &input.estado {
        Some(raw) => match validate_estado(raw) {
            Ok(estado) => Some(estado),
            Err(err) => {
                errors.add(err);
                None
            }
        },
        // Absent on update keeps the current state; on create, the default.
        None => Some(existing.map(|s| s.estado).unwrap_or_default()),
    };

    match (mac_address, modelo, estado, errors.is_empty()) {
        (Some(mac_address), Some(modelo), Some(estado), true) => Ok(SensorDraft {
            mac_address,
            modelo,
            estado,
            departamento,
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

/// Validate an event payload. The target sensor's state is checked later by
/// rules.rs against the resolved Sensor entity.
pub fn validate_evento(
    input: &EventoInput,
    existing: Option<&Evento>,
) -> Result<EventoDraft, ApiError> {
    let mut errors = FieldErrors::new();

    let sensor = match input.sensor.or_else(|| existing.map(|e| e.sensor)) {
        Some(sensor) => Some(sensor),
        None => {
            errors.add(ValidationError::required("sensor"));
            None
        }
    };

    let tipo = match &input.tipo {
        Some(raw) => match validate_tipo(raw) {
            Ok(tipo) => Some(tipo),
            Err(err) => {
                errors.add(err);
                None
            }
        },
        None => match existing.map(|e| e.tipo) {
            Some(tipo) => Some(tipo),
            None => {
                errors.add(ValidationError::required("tipo"));
                None
            }
        },
    };

    let descripcion_raw = input
        .descripcion
        .clone()
        .or_else(|| existing.map(|e| e.descripcion.clone()))
        .unwrap_or_default();
    let descripcion = match validate_evento_descripcion(&descripcion_raw) {
        Ok(descripcion) => Some(descripcion),
        Err(err) => {
            errors.add(err);
            None
        }
    };

    match (sensor, tipo, descripcion, errors.is_empty()) {
        (Some(sensor), Some(tipo), Some(descripcion), true) => Ok(EventoDraft {
            sensor,
            tipo,
            descripcion,
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
