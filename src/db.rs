// Persistence Layer
// rusqlite-backed store for departamentos, sensores, eventos and API
// tokens. Referential integrity on delete is driven by the explicit
// cascade policy table below instead of foreign-key annotations: deleting
// a department clears the reference on its sensors, deleting a sensor
// deletes its events.
//
// The storage-level UNIQUE constraint on mac_address is the final
// authority for uniqueness; the validator queries here are the
// user-friendly pre-check.

use crate::auth::Role;
use crate::entities::{Departamento, Estado, Evento, Sensor, TipoEvento};
use crate::validators::{DepartamentoDraft, EventoDraft, SensorDraft};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

// ============================================================================
// CASCADE POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Clear the child's reference, keep the child row.
    SetNull,
    /// Delete the child rows outright.
    Cascade,
}

#[derive(Debug, Clone, Copy)]
pub struct CascadeRule {
    pub child_table: &'static str,
    pub child_column: &'static str,
    pub on_delete: OnDelete,
}

/// Sensors survive their department; events do not survive their sensor.
pub const DEPARTAMENTO_CASCADES: &[CascadeRule] = &[CascadeRule {
    child_table: "sensores",
    child_column: "departamento",
    on_delete: OnDelete::SetNull,
}];

pub const SENSOR_CASCADES: &[CascadeRule] = &[CascadeRule {
    child_table: "eventos",
    child_column: "sensor",
    on_delete: OnDelete::Cascade,
}];

fn apply_cascades(conn: &Connection, rules: &[CascadeRule], parent_id: i64) -> Result<()> {
    for rule in rules {
        let sql = match rule.on_delete {
            OnDelete::SetNull => format!(
                "UPDATE {} SET {} = NULL WHERE {} = ?1",
                rule.child_table, rule.child_column, rule.child_column
            ),
            OnDelete::Cascade => format!(
                "DELETE FROM {} WHERE {} = ?1",
                rule.child_table, rule.child_column
            ),
        };
        conn.execute(&sql, params![parent_id])
            .with_context(|| format!("Failed to cascade delete into {}", rule.child_table))?;
    }
    Ok(())
}

// ============================================================================
// SETUP
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS departamentos (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre      TEXT NOT NULL,
            descripcion TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sensores (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            mac_address  TEXT NOT NULL UNIQUE,
            modelo       TEXT NOT NULL,
            estado       TEXT NOT NULL DEFAULT 'inactivo',
            departamento INTEGER,
            created_at   TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS eventos (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            sensor         INTEGER NOT NULL,
            tipo           TEXT NOT NULL,
            descripcion    TEXT NOT NULL,
            fecha_registro TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS api_tokens (
            token TEXT PRIMARY KEY,
            role  TEXT NOT NULL
        );",
    )
    .context("Failed to create database schema")
}

// ============================================================================
// ROW CONVERSION HELPERS
// ============================================================================

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp: {}", raw))
}

fn parse_estado(raw: &str) -> Result<Estado> {
    Estado::parse(raw).ok_or_else(|| anyhow!("Unknown estado stored: {}", raw))
}

fn parse_tipo(raw: &str) -> Result<TipoEvento> {
    TipoEvento::parse(raw).ok_or_else(|| anyhow!("Unknown tipo stored: {}", raw))
}

type DepartamentoRow = (i64, String, Option<String>, String);
type SensorRow = (i64, String, String, String, Option<i64>, String);
type EventoRow = (i64, i64, String, String, String);

fn departamento_from_row(row: DepartamentoRow) -> Result<Departamento> {
    let (id, nombre, descripcion, created_at) = row;
    Ok(Departamento {
        id,
        nombre,
        descripcion,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn sensor_from_row(row: SensorRow) -> Result<Sensor> {
    let (id, mac_address, modelo, estado, departamento, created_at) = row;
    Ok(Sensor {
        id,
        mac_address,
        modelo,
        estado: parse_estado(&estado)?,
        departamento,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn evento_from_row(row: EventoRow) -> Result<Evento> {
    let (id, sensor, tipo, descripcion, fecha_registro) = row;
    Ok(Evento {
        id,
        sensor,
        tipo: parse_tipo(&tipo)?,
        descripcion,
        fecha_registro: parse_timestamp(&fecha_registro)?,
    })
}

// ============================================================================
// DEPARTAMENTOS
// ============================================================================

pub fn insert_departamento(conn: &Connection, draft: &DepartamentoDraft) -> Result<Departamento> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO departamentos (nombre, descripcion, created_at) VALUES (?1, ?2, ?3)",
        params![draft.nombre, draft.descripcion, created_at.to_rfc3339()],
    )
    .context("Failed to insert departamento")?;

    Ok(Departamento {
        id: conn.last_insert_rowid(),
        nombre: draft.nombre.clone(),
        descripcion: draft.descripcion.clone(),
        created_at,
    })
}

pub fn get_departamento(conn: &Connection, id: i64) -> Result<Option<Departamento>> {
    let row: Option<DepartamentoRow> = conn
        .query_row(
            "SELECT id, nombre, descripcion, created_at FROM departamentos WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .context("Failed to query departamento")?;

    row.map(departamento_from_row).transpose()
}

pub fn get_all_departamentos(conn: &Connection) -> Result<Vec<Departamento>> {
    let mut stmt = conn
        .prepare("SELECT id, nombre, descripcion, created_at FROM departamentos ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    })?;

    let mut departamentos = Vec::new();
    for row in rows {
        departamentos.push(departamento_from_row(row?)?);
    }
    Ok(departamentos)
}

pub fn update_departamento(conn: &Connection, id: i64, draft: &DepartamentoDraft) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE departamentos SET nombre = ?1, descripcion = ?2 WHERE id = ?3",
            params![draft.nombre, draft.descripcion, id],
        )
        .context("Failed to update departamento")?;
    Ok(updated > 0)
}

/// Hard delete. Referencing sensors are kept with a cleared department
/// reference (set-null policy).
pub fn delete_departamento(conn: &Connection, id: i64) -> Result<bool> {
    apply_cascades(conn, DEPARTAMENTO_CASCADES, id)?;
    let deleted = conn
        .execute("DELETE FROM departamentos WHERE id = ?1", params![id])
        .context("Failed to delete departamento")?;
    Ok(deleted > 0)
}

/// Existing department names for the case-insensitive uniqueness pre-check,
/// excluding the record being edited when `exclude_id` is set.
pub fn departamento_nombres(conn: &Connection, exclude_id: Option<i64>) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT nombre FROM departamentos WHERE ?1 IS NULL OR id != ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![exclude_id], |row| row.get::<_, String>(0))?;

    let mut nombres = Vec::new();
    for row in rows {
        nombres.push(row?);
    }
    Ok(nombres)
}

// ============================================================================
// SENSORES
// ============================================================================

pub fn insert_sensor(conn: &Connection, draft: &SensorDraft) -> Result<Sensor> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO sensores (mac_address, modelo, estado, departamento, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            draft.mac_address,
            draft.modelo,
            draft.estado.as_str(),
            draft.departamento,
            created_at.to_rfc3339()
        ],
    )
    .context("Failed to insert sensor")?;

    Ok(Sensor {
        id: conn.last_insert_rowid(),
        mac_address: draft.mac_address.clone(),
        modelo: draft.modelo.clone(),
        estado: draft.estado,
        departamento: draft.departamento,
        created_at,
    })
}

pub fn get_sensor(conn: &Connection, id: i64) -> Result<Option<Sensor>> {
    let row: Option<SensorRow> = conn
        .query_row(
            "SELECT id, mac_address, modelo, estado, departamento, created_at
             FROM sensores WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()
        .context("Failed to query sensor")?;

    row.map(sensor_from_row).transpose()
}

pub fn get_all_sensores(conn: &Connection) -> Result<Vec<Sensor>> {
    let mut stmt = conn.prepare(
        "SELECT id, mac_address, modelo, estado, departamento, created_at
         FROM sensores ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    })?;

    let mut sensores = Vec::new();
    for row in rows {
        sensores.push(sensor_from_row(row?)?);
    }
    Ok(sensores)
}

pub fn update_sensor(conn: &Connection, id: i64, draft: &SensorDraft) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE sensores SET mac_address = ?1, modelo = ?2, estado = ?3, departamento = ?4
             WHERE id = ?5",
            params![
                draft.mac_address,
                draft.modelo,
                draft.estado.as_str(),
                draft.departamento,
                id
            ],
        )
        .context("Failed to update sensor")?;
    Ok(updated > 0)
}

/// Hard delete; the sensor's events go with it (cascade policy).
pub fn delete_sensor(conn: &Connection, id: i64) -> Result<bool> {
    apply_cascades(conn, SENSOR_CASCADES, id)?;
    let deleted = conn
        .execute("DELETE FROM sensores WHERE id = ?1", params![id])
        .context("Failed to delete sensor")?;
    Ok(deleted > 0)
}

/// Pre-check for the UNIQUE constraint on mac_address. The stored value is
/// already uppercased, so an exact match suffices for normalized input.
pub fn mac_exists(conn: &Connection, mac: &str, exclude_id: Option<i64>) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM sensores WHERE mac_address = ?1 AND (?2 IS NULL OR id != ?2)",
            params![mac, exclude_id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query mac_address")?;
    Ok(found.is_some())
}

// ============================================================================
// EVENTOS
// ============================================================================

pub fn insert_evento(conn: &Connection, draft: &EventoDraft) -> Result<Evento> {
    let fecha_registro = Utc::now();
    conn.execute(
        "INSERT INTO eventos (sensor, tipo, descripcion, fecha_registro)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            draft.sensor,
            draft.tipo.as_str(),
            draft.descripcion,
            fecha_registro.to_rfc3339()
        ],
    )
    .context("Failed to insert evento")?;

    Ok(Evento {
        id: conn.last_insert_rowid(),
        sensor: draft.sensor,
        tipo: draft.tipo,
        descripcion: draft.descripcion.clone(),
        fecha_registro,
    })
}

pub fn get_evento(conn: &Connection, id: i64) -> Result<Option<Evento>> {
    let row: Option<EventoRow> = conn
        .query_row(
            "SELECT id, sensor, tipo, descripcion, fecha_registro FROM eventos WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()
        .context("Failed to query evento")?;

    row.map(evento_from_row).transpose()
}

pub fn get_all_eventos(conn: &Connection) -> Result<Vec<Evento>> {
    let mut stmt = conn
        .prepare("SELECT id, sensor, tipo, descripcion, fecha_registro FROM eventos ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    })?;

    let mut eventos = Vec::new();
    for row in rows {
        eventos.push(evento_from_row(row?)?);
    }
    Ok(eventos)
}

/// fecha_registro is immutable; only the caller-writable fields change.
pub fn update_evento(conn: &Connection, id: i64, draft: &EventoDraft) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE eventos SET sensor = ?1, tipo = ?2, descripcion = ?3 WHERE id = ?4",
            params![draft.sensor, draft.tipo.as_str(), draft.descripcion, id],
        )
        .context("Failed to update evento")?;
    Ok(updated > 0)
}

pub fn delete_evento(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM eventos WHERE id = ?1", params![id])
        .context("Failed to delete evento")?;
    Ok(deleted > 0)
}

// ============================================================================
// API TOKENS
// ============================================================================

pub fn upsert_token(conn: &Connection, token: &str, role: Role) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO api_tokens (token, role) VALUES (?1, ?2)",
        params![token, role.as_str()],
    )
    .context("Failed to store token")?;
    Ok(())
}

/// Resolve a presented bearer token to its role. Unknown tokens resolve to
/// nothing; the caller stays anonymous.
pub fn find_role_by_token(conn: &Connection, token: &str) -> Result<Option<Role>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT role FROM api_tokens WHERE token = ?1",
            params![token],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query token")?;

    match raw {
        Some(raw) => Role::parse(&raw)
            .map(Some)
            .ok_or_else(|| anyhow!("Unknown role stored for token: {}", raw)),
        None => Ok(None),
    }
}

// ============================================================================
// TESTS
// ============================================================================
