// Error Normalization
// Every failure the core produces collapses into one uniform payload:
// {status_code, error_type, detail, field_errors?}. The HTTP layer only
// decides the status line; the shape is decided here.

use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// FIELD-LEVEL VALIDATION ERROR
// ============================================================================

/// A single violated field rule: machine-readable field key plus a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Standard "missing required field" error.
    pub fn required(field: &str) -> Self {
        ValidationError::new(field, "Este campo es obligatorio.")
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// ACCUMULATED FIELD ERRORS
// ============================================================================

/// Field key → message list. Independent fields accumulate their first
/// violation each; a field never reports twice for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        FieldErrors::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add(&mut self, error: ValidationError) {
        self.push(&error.field, error.message);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    /// Ok when nothing accumulated, otherwise a Validation failure.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }

    fn into_map(self) -> BTreeMap<String, Vec<String>> {
        self.errors
    }
}

// ============================================================================
// FAILURE TAXONOMY
// ============================================================================

/// Every failure kind the core can surface. Each one is scoped to a single
/// request; none is fatal to the process.
#[derive(Debug)]
pub enum ApiError {
    /// No valid caller identity presented.
    Unauthenticated,
    /// Authenticated, but the policy table denies the operation.
    Forbidden,
    /// A resource id did not resolve.
    NotFound,
    /// No endpoint matched the request at all.
    RouteNotFound,
    /// One or more field-level or cross-field rules violated.
    Validation(FieldErrors),
    /// Anything unexpected from a collaborator (store, serialization).
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Unauthenticated => 401,
            ApiError::Forbidden => 403,
            ApiError::NotFound | ApiError::RouteNotFound => 404,
            ApiError::Validation(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "Unauthenticated",
            ApiError::Forbidden => "Forbidden",
            ApiError::NotFound => "NotFound",
            ApiError::RouteNotFound => "RouteNotFound",
            ApiError::Validation(_) => "Validation",
            ApiError::Internal(_) => "Internal",
        }
    }

    /// Stable per-kind summary shown to the caller.
    pub fn detail(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "No estás autenticado. Revisa el token de acceso.",
            ApiError::Forbidden => {
                "Acceso denegado. No tienes permisos suficientes para realizar esta acción."
            }
            ApiError::NotFound => "El recurso solicitado no existe o fue eliminado.",
            ApiError::RouteNotFound => "La ruta solicitada no existe en esta API.",
            ApiError::Validation(_) => "Error de validación. Revisa los datos enviados.",
            ApiError::Internal(_) => "Ha ocurrido un error en la solicitud.",
        }
    }

    /// Collapse into the uniform wire payload.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            status_code: self.status_code(),
            error_type: self.error_type().to_string(),
            detail: self.detail().to_string(),
            field_errors: match self {
                ApiError::Validation(errors) => Some(errors.clone().into_map()),
                _ => None,
            },
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Validation(errors) => {
                write!(f, "{}: {} campo(s)", self.detail(), errors.errors.len())
            }
            ApiError::Internal(err) => write!(f, "{}: {}", self.detail(), err),
            _ => f.write_str(self.detail()),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Internal(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(FieldErrors::single(&err.field, err.message))
    }
}

// ============================================================================
// UNIFORM WIRE PAYLOAD
// ============================================================================

/// The single error shape every failing request answers with.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub status_code: u16,
    pub error_type: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
}

// ============================================================================
// TESTS
// ============================================================================
