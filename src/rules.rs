// Cross-Field Rule Engine
// Whole-record invariants that span multiple fields or a related entity's
// state. These run only after every field-level check in validators.rs has
// passed, and on every create and update against the merged view of the
// candidate record.

use crate::entities::{Estado, Sensor};
use crate::errors::{ApiError, FieldErrors};
use crate::validators::SensorDraft;

/// Sensor estado/departamento coupling. The two rules are independent:
/// activo requires an assigned department, perdido forbids one, and
/// inactivo/bloqueado trigger neither. Violations report under `estado`.
pub fn check_sensor_rules(draft: &SensorDraft) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();

    if draft.estado == Estado::Activo && draft.departamento.is_none() {
        errors.push(
            "estado",
            "No puedes activar un sensor si no está asignado a un departamento.",
        );
    }

    if draft.estado == Estado::Perdido && draft.departamento.is_some() {
        errors.push(
            "estado",
            "Un sensor perdido no puede permanecer asignado a un departamento.",
        );
    }

    errors.into_result()
}

/// An event may only be recorded against a sensor that is not bloqueado or
/// perdido. The message names the sensor's MAC and current state.
pub fn check_evento_rules(sensor: &Sensor) -> Result<(), ApiError> {
    if sensor.estado.admits_eventos() {
        return Ok(());
    }

    Err(ApiError::Validation(FieldErrors::single(
        "sensor",
        format!(
            "No se pueden registrar eventos para el sensor {} en estado {}.",
            sensor.mac_address, sensor.estado
        ),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn draft(estado: Estado, departamento: Option<i64>) -> SensorDraft {
        SensorDraft {
            mac_address: "AA:BB:CC:11:22:33".to_string(),
            modelo: "ESP32".to_string(),
            estado,
            departamento,
        }
    }

    fn sensor(estado: Estado) -> Sensor {
        Sensor {
            id: 1,
            mac_address: "AA:BB:CC:11:22:33".to_string(),
            modelo: "ESP32".to_string(),
            estado,
            departamento: Some(2),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_activo_requires_departamento() {
        match check_sensor_rules(&draft(Estado::Activo, None)).unwrap_err() {
            ApiError::Validation(errors) => assert!(errors.contains("estado")),
            other => panic!("expected Validation, got {:?}", other),
        }
        assert!(check_sensor_rules(&draft(Estado::Activo, Some(1))).is_ok());
    }

    #[test]
    fn test_perdido_forbids_departamento() {
        match check_sensor_rules(&draft(Estado::Perdido, Some(1))).unwrap_err() {
            ApiError::Validation(errors) => assert!(errors.contains("estado")),
            other => panic!("expected Validation, got {:?}", other),
        }
        assert!(check_sensor_rules(&draft(Estado::Perdido, None)).is_ok());
    }

    #[test]
    fn test_inactivo_and_bloqueado_are_unconstrained() {
        for estado in [Estado::Inactivo, Estado::Bloqueado] {
            assert!(check_sensor_rules(&draft(estado, None)).is_ok());
            assert!(check_sensor_rules(&draft(estado, Some(1))).is_ok());
        }
    }

    #[test]
    fn test_evento_rejected_for_bloqueado_and_perdido() {
        for estado in [Estado::Bloqueado, Estado::Perdido] {
            match check_evento_rules(&sensor(estado)).unwrap_err() {
                ApiError::Validation(errors) => {
                    let mensaje = &errors.messages("sensor").unwrap()[0];
                    assert!(mensaje.contains("AA:BB:CC:11:22:33"), "{mensaje}");
                    assert!(mensaje.contains(estado.as_str()), "{mensaje}");
                }
                other => panic!("expected Validation, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_evento_allowed_for_activo_and_inactivo() {
        assert!(check_evento_rules(&sensor(Estado::Activo)).is_ok());
        assert!(check_evento_rules(&sensor(Estado::Inactivo)).is_ok());
    }
}
