// Departamento Entity
// A department groups the sensors installed in one area of the building.
// Deleting a department never deletes its sensors; their reference is
// cleared instead (see the cascade policy in db.rs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted department record. `id` and `created_at` are system-assigned
/// and immutable; only `nombre` and `descripcion` are caller-writable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Departamento {
    pub id: i64,
    pub nombre: String,
    pub descripcion: Option<String>,
    pub created_at: DateTime<Utc>,
}
