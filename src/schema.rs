// Shape Layer - Entity Schemas
// One explicit schema per entity: every API-surface field, its kind, and
// who may write it. Replaces what a framework serializer would infer: the
// HTTP layer strips non-writable keys from incoming payloads before
// deserializing, so callers can never set system-assigned or derived
// fields.

use serde_json::{Map, Value};

// ============================================================================
// FIELD SPECS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    Choice,
    Reference,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writability {
    /// Accepted from the caller's payload.
    Caller,
    /// Assigned by the system, immutable afterwards.
    System,
    /// Read-only projection joined onto responses.
    Derived,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub writability: Writability,
}

const fn field(name: &'static str, kind: FieldKind, writability: Writability) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        writability,
    }
}

// ============================================================================
// ENTITY SCHEMAS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct EntitySchema {
    pub entity: &'static str,
    pub fields: &'static [FieldSpec],
}

pub const DEPARTAMENTO: EntitySchema = EntitySchema {
    entity: "departamento",
    fields: &[
        field("id", FieldKind::Integer, Writability::System),
        field("nombre", FieldKind::Text, Writability::Caller),
        field("descripcion", FieldKind::Text, Writability::Caller),
        field("created_at", FieldKind::Timestamp, Writability::System),
    ],
};

pub const SENSOR: EntitySchema = EntitySchema {
    entity: "sensor",
    fields: &[
        field("id", FieldKind::Integer, Writability::System),
        field("mac_address", FieldKind::Text, Writability::Caller),
        field("modelo", FieldKind::Text, Writability::Caller),
        field("estado", FieldKind::Choice, Writability::Caller),
        field("departamento", FieldKind::Reference, Writability::Caller),
        field("departamento_nombre", FieldKind::Text, Writability::Derived),
        field("created_at", FieldKind::Timestamp, Writability::System),
    ],
};

pub const EVENTO: EntitySchema = EntitySchema {
    entity: "evento",
    fields: &[
        field("id", FieldKind::Integer, Writability::System),
        field("sensor", FieldKind::Reference, Writability::Caller),
        field("tipo", FieldKind::Choice, Writability::Caller),
        field("descripcion", FieldKind::Text, Writability::Caller),
        field("sensor_detalle", FieldKind::Text, Writability::Derived),
        field("fecha_registro", FieldKind::Timestamp, Writability::System),
    ],
};

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_writable(&self, name: &str) -> bool {
        matches!(
            self.field(name),
            Some(FieldSpec {
                writability: Writability::Caller,
                ..
            })
        )
    }

    /// Drop every key the caller may not write, including unknown keys.
    /// Mirrors a framework serializer silently ignoring read-only input.
    pub fn strip_non_writable(&self, payload: &mut Map<String, Value>) {
        payload.retain(|key, _| self.is_writable(key));
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_every_schema_has_system_id_and_timestamp() {
        for schema in [DEPARTAMENTO, SENSOR, EVENTO] {
            let id = schema.field("id").unwrap();
            assert_eq!(id.writability, Writability::System);

            let has_system_timestamp = schema.fields.iter().any(|f| {
                f.kind == FieldKind::Timestamp && f.writability == Writability::System
            });
            assert!(has_system_timestamp, "{}", schema.entity);
        }
    }

    #[test]
    fn test_strip_removes_system_and_derived_fields() {
        let mut payload = as_map(json!({
            "id": 99,
            "mac_address": "AA:BB:CC:11:22:33",
            "modelo": "ESP32",
            "departamento_nombre": "Bodega",
            "created_at": "2026-01-01T00:00:00Z"
        }));

        SENSOR.strip_non_writable(&mut payload);

        assert!(payload.contains_key("mac_address"));
        assert!(payload.contains_key("modelo"));
        assert!(!payload.contains_key("id"));
        assert!(!payload.contains_key("departamento_nombre"));
        assert!(!payload.contains_key("created_at"));
    }

    #[test]
    fn test_strip_removes_unknown_fields() {
        let mut payload = as_map(json!({
            "nombre": "Bodega",
            "superusuario": true
        }));

        DEPARTAMENTO.strip_non_writable(&mut payload);

        assert!(payload.contains_key("nombre"));
        assert!(!payload.contains_key("superusuario"));
    }

    #[test]
    fn test_strip_keeps_explicit_null_reference() {
        let mut payload = as_map(json!({"departamento": null, "estado": "perdido"}));
        SENSOR.strip_non_writable(&mut payload);

        assert!(payload.contains_key("departamento"));
        assert!(payload.contains_key("estado"));
    }

    #[test]
    fn test_fecha_registro_is_never_writable() {
        assert!(!EVENTO.is_writable("fecha_registro"));
        assert!(!EVENTO.is_writable("sensor_detalle"));
        assert!(EVENTO.is_writable("descripcion"));
    }
}
