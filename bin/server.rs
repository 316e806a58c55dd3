// SmartConnect - API Server
// Thin axum wiring over the core: every protected handler resolves the
// caller, runs authorize → field validators → cross-field rules → store,
// and lets AppError collapse any failure into the uniform error payload.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use smartconnect::schema::EntitySchema;
use smartconnect::{
    authorize, check_evento_rules, check_sensor_rules, db, schema, validate_departamento,
    validate_evento, validate_sensor, Access, ApiError, Caller, Departamento, DepartamentoInput,
    Evento, EventoInput, FieldErrors, Resource, Role, Sensor, SensorDraft, SensorInput,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

// ============================================================================
// Error boundary
// ============================================================================

/// Newtype so every core failure becomes the uniform payload at the single
/// HTTP boundary.
struct AppError(ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self.0 {
            tracing::error!(error = %err, "internal error");
        }
        let payload = self.0.to_payload();
        let status =
            StatusCode::from_u16(payload.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(payload)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError(ApiError::Internal(err))
    }
}

// ============================================================================
// Caller resolution
// ============================================================================

/// Resolve `Authorization: Bearer <token>` to a caller. Anything missing,
/// malformed or unknown stays anonymous; authorize() turns that into 401.
fn resolve_caller(conn: &Connection, headers: &HeaderMap) -> Caller {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) => match db::find_role_by_token(conn, token) {
            Ok(Some(role)) => Caller::new(role),
            Ok(None) => Caller::anonymous(),
            Err(err) => {
                tracing::warn!(error = %err, "token lookup failed");
                Caller::anonymous()
            }
        },
        None => Caller::anonymous(),
    }
}

/// Parse the raw request body, strip non-writable keys per the entity
/// schema, then deserialize the caller-writable remainder. The body is
/// taken raw so parsing happens here, after authorize(), and a broken
/// body fails through the same uniform payload as any other validation.
fn parse_input<T: DeserializeOwned>(schema: &EntitySchema, body: &[u8]) -> Result<T, ApiError> {
    let payload: Value = serde_json::from_slice(body).map_err(|err| {
        ApiError::Validation(FieldErrors::single(
            "non_field_errors",
            format!("El cuerpo de la petición no es JSON válido: {}", err),
        ))
    })?;
    let mut map = match payload {
        Value::Object(map) => map,
        _ => {
            return Err(ApiError::Validation(FieldErrors::single(
                "non_field_errors",
                "El cuerpo de la petición debe ser un objeto JSON.",
            )))
        }
    };
    schema.strip_non_writable(&mut map);

    serde_json::from_value(Value::Object(map)).map_err(|err| {
        ApiError::Validation(FieldErrors::single(
            "non_field_errors",
            format!("El cuerpo de la petición no es válido: {}", err),
        ))
    })
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize)]
struct DepartamentoResponse {
    id: i64,
    nombre: String,
    descripcion: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<Departamento> for DepartamentoResponse {
    fn from(dep: Departamento) -> Self {
        Self {
            id: dep.id,
            nombre: dep.nombre,
            descripcion: dep.descripcion,
            created_at: dep.created_at,
        }
    }
}

#[derive(Serialize)]
struct SensorResponse {
    id: i64,
    mac_address: String,
    modelo: String,
    estado: smartconnect::Estado,
    departamento: Option<i64>,
    /// Derived, read-only projection of the assigned department's name.
    departamento_nombre: Option<String>,
    created_at: DateTime<Utc>,
}

fn sensor_response(conn: &Connection, sensor: Sensor) -> Result<SensorResponse, AppError> {
    let departamento_nombre = match sensor.departamento {
        Some(dep_id) => db::get_departamento(conn, dep_id)?.map(|d| d.nombre),
        None => None,
    };
    Ok(SensorResponse {
        id: sensor.id,
        mac_address: sensor.mac_address,
        modelo: sensor.modelo,
        estado: sensor.estado,
        departamento: sensor.departamento,
        departamento_nombre,
        created_at: sensor.created_at,
    })
}

#[derive(Serialize)]
struct EventoResponse {
    id: i64,
    sensor: i64,
    tipo: smartconnect::TipoEvento,
    descripcion: String,
    /// Derived, read-only projection of the sensor's model name.
    sensor_detalle: Option<String>,
    fecha_registro: DateTime<Utc>,
}

fn evento_response(conn: &Connection, evento: Evento) -> Result<EventoResponse, AppError> {
    let sensor_detalle = db::get_sensor(conn, evento.sensor)?.map(|s| s.modelo);
    Ok(EventoResponse {
        id: evento.id,
        sensor: evento.sensor,
        tipo: evento.tipo,
        descripcion: evento.descripcion,
        sensor_detalle,
        fecha_registro: evento.fecha_registro,
    })
}

// ============================================================================
// Public endpoints
// ============================================================================

/// GET /api/info - Public metadata, the only unauthenticated endpoint
async fn api_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "proyecto": "SmartConnect API",
        "descripcion": "API para gestión de sensores IoT y control de acceso",
        "version": smartconnect::VERSION,
    }))
}

/// Fallback for URLs matching no defined resource
async fn route_not_found() -> AppError {
    AppError(ApiError::RouteNotFound)
}

// ============================================================================
// Departamentos
// ============================================================================

/// GET /api/departamentos
async fn list_departamentos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DepartamentoResponse>>, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Departamentos, Access::Read)?;

    let departamentos = db::get_all_departamentos(&conn)?;
    Ok(Json(departamentos.into_iter().map(Into::into).collect()))
}

/// POST /api/departamentos
async fn create_departamento(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DepartamentoResponse>), AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Departamentos, Access::Write)?;

    let input: DepartamentoInput = parse_input(&schema::DEPARTAMENTO, &body)?;
    let nombres = db::departamento_nombres(&conn, None)?;
    let draft = validate_departamento(&input, None, &nombres)?;

    let departamento = db::insert_departamento(&conn, &draft)?;
    Ok((StatusCode::CREATED, Json(departamento.into())))
}

/// GET /api/departamentos/:id
async fn get_departamento(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<DepartamentoResponse>, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Departamentos, Access::Read)?;

    let departamento = db::get_departamento(&conn, id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(departamento.into()))
}

/// PUT /api/departamentos/:id
async fn update_departamento(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<DepartamentoResponse>, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Departamentos, Access::Write)?;

    let existing = db::get_departamento(&conn, id)?.ok_or(ApiError::NotFound)?;
    let input: DepartamentoInput = parse_input(&schema::DEPARTAMENTO, &body)?;
    let nombres = db::departamento_nombres(&conn, Some(id))?;
    let draft = validate_departamento(&input, Some(&existing), &nombres)?;

    db::update_departamento(&conn, id, &draft)?;
    let updated = db::get_departamento(&conn, id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(updated.into()))
}

/// DELETE /api/departamentos/:id
async fn delete_departamento(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Departamentos, Access::Write)?;

    if !db::delete_departamento(&conn, id)? {
        return Err(AppError(ApiError::NotFound));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Sensores
// ============================================================================

/// Store-backed checks that are field-level in nature: MAC uniqueness and
/// the department reference resolving. Accumulated like any other field
/// error, before the cross-field rules run.
fn check_sensor_references(
    conn: &Connection,
    draft: &SensorDraft,
    exclude_id: Option<i64>,
) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();

    if db::mac_exists(conn, &draft.mac_address, exclude_id)? {
        errors.push("mac_address", "Ya existe un sensor con esa dirección MAC.");
    }
    if let Some(dep_id) = draft.departamento {
        if db::get_departamento(conn, dep_id)?.is_none() {
            errors.push("departamento", "El departamento indicado no existe.");
        }
    }

    errors.into_result()
}

/// GET /api/sensores
async fn list_sensores(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SensorResponse>>, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Sensores, Access::Read)?;

    let mut respuestas = Vec::new();
    for sensor in db::get_all_sensores(&conn)? {
        respuestas.push(sensor_response(&conn, sensor)?);
    }
    Ok(Json(respuestas))
}

/// POST /api/sensores
async fn create_sensor(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<SensorResponse>), AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Sensores, Access::Write)?;

    let input: SensorInput = parse_input(&schema::SENSOR, &body)?;
    let draft = validate_sensor(&input, None)?;
    check_sensor_references(&conn, &draft, None)?;
    check_sensor_rules(&draft)?;

    let sensor = db::insert_sensor(&conn, &draft)?;
    Ok((StatusCode::CREATED, Json(sensor_response(&conn, sensor)?)))
}

/// GET /api/sensores/:id
async fn get_sensor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<SensorResponse>, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Sensores, Access::Read)?;

    let sensor = db::get_sensor(&conn, id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(sensor_response(&conn, sensor)?))
}

/// PUT /api/sensores/:id
async fn update_sensor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<SensorResponse>, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Sensores, Access::Write)?;

    let existing = db::get_sensor(&conn, id)?.ok_or(ApiError::NotFound)?;
    let input: SensorInput = parse_input(&schema::SENSOR, &body)?;
    // Rules re-run against the merged view of changed + unchanged fields.
    let draft = validate_sensor(&input, Some(&existing))?;
    check_sensor_references(&conn, &draft, Some(id))?;
    check_sensor_rules(&draft)?;

    db::update_sensor(&conn, id, &draft)?;
    let updated = db::get_sensor(&conn, id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(sensor_response(&conn, updated)?))
}

/// DELETE /api/sensores/:id
async fn delete_sensor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Sensores, Access::Write)?;

    if !db::delete_sensor(&conn, id)? {
        return Err(AppError(ApiError::NotFound));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Eventos
// ============================================================================

/// GET /api/eventos
async fn list_eventos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<EventoResponse>>, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Eventos, Access::Read)?;

    let mut respuestas = Vec::new();
    for evento in db::get_all_eventos(&conn)? {
        respuestas.push(evento_response(&conn, evento)?);
    }
    Ok(Json(respuestas))
}

/// POST /api/eventos
async fn create_evento(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<EventoResponse>), AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Eventos, Access::Write)?;

    let input: EventoInput = parse_input(&schema::EVENTO, &body)?;
    let draft = validate_evento(&input, None)?;

    let sensor = db::get_sensor(&conn, draft.sensor)?.ok_or_else(|| {
        ApiError::Validation(FieldErrors::single("sensor", "El sensor indicado no existe."))
    })?;
    // Recording is refused while the sensor is bloqueado or perdido.
    check_evento_rules(&sensor)?;

    let evento = db::insert_evento(&conn, &draft)?;
    Ok((StatusCode::CREATED, Json(evento_response(&conn, evento)?)))
}

/// GET /api/eventos/:id
async fn get_evento(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<EventoResponse>, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Eventos, Access::Read)?;

    let evento = db::get_evento(&conn, id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(evento_response(&conn, evento)?))
}

/// PUT /api/eventos/:id
/// Structural only: field validation applies, but the sensor-state rule is
/// create-time (events record a moment, edits do not re-gate it).
async fn update_evento(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<EventoResponse>, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Eventos, Access::Write)?;

    let existing = db::get_evento(&conn, id)?.ok_or(ApiError::NotFound)?;
    let input: EventoInput = parse_input(&schema::EVENTO, &body)?;
    let draft = validate_evento(&input, Some(&existing))?;

    if db::get_sensor(&conn, draft.sensor)?.is_none() {
        return Err(AppError(ApiError::Validation(FieldErrors::single(
            "sensor",
            "El sensor indicado no existe.",
        ))));
    }

    db::update_evento(&conn, id, &draft)?;
    let updated = db::get_evento(&conn, id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(evento_response(&conn, updated)?))
}

/// DELETE /api/eventos/:id
async fn delete_evento(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let conn = state.db.lock().unwrap();
    let caller = resolve_caller(&conn, &headers);
    authorize(&caller, Resource::Eventos, Access::Write)?;

    if !db::delete_evento(&conn, id)? {
        return Err(AppError(ApiError::NotFound));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Main Server
// ============================================================================

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/info", get(api_info))
        .route(
            "/departamentos",
            get(list_departamentos).post(create_departamento),
        )
        .route(
            "/departamentos/:id",
            get(get_departamento)
                .put(update_departamento)
                .delete(delete_departamento),
        )
        .route("/sensores", get(list_sensores).post(create_sensor))
        .route(
            "/sensores/:id",
            get(get_sensor).put(update_sensor).delete(delete_sensor),
        )
        .route("/eventos", get(list_eventos).post(create_evento))
        .route(
            "/eventos/:id",
            get(get_evento).put(update_evento).delete(delete_evento),
        )
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .fallback(route_not_found)
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smartconnect_server=info,smartconnect=info".into()),
        )
        .init();

    let db_path =
        std::env::var("SMARTCONNECT_DB").unwrap_or_else(|_| "smartconnect.db".to_string());
    let conn = Connection::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    db::setup_database(&conn)?;
    tracing::info!(path = %db_path, "database ready");

    // Bootstrap credential so a fresh deployment has an admin caller.
    if let Ok(token) = std::env::var("SMARTCONNECT_ADMIN_TOKEN") {
        db::upsert_token(&conn, &token, Role::Admin)?;
        tracing::info!("admin token registered");
    }

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };
    let app = build_router(state);

    let addr =
        std::env::var("SMARTCONNECT_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(%addr, "server running");

    axum::serve(listener, app).await.context("Server error")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        db::upsert_token(&conn, "token-admin", Role::Admin).unwrap();
        db::upsert_token(&conn, "token-user", Role::User).unwrap();
        build_router(AppState {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn post(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn payload_of(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_broken_json_without_token_is_unauthenticated() {
        let response = test_router()
            .oneshot(post("/api/departamentos", None, "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let payload = payload_of(response).await;
        assert_eq!(payload["error_type"], "Unauthenticated");
        assert_eq!(payload["status_code"], 401);
    }

    #[tokio::test]
    async fn test_broken_json_from_forbidden_caller_stays_forbidden() {
        let response = test_router()
            .oneshot(post("/api/departamentos", Some("token-user"), "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let payload = payload_of(response).await;
        assert_eq!(payload["error_type"], "Forbidden");
        assert!(payload.get("field_errors").is_none());
    }

    #[tokio::test]
    async fn test_broken_json_from_admin_is_uniform_validation_payload() {
        let response = test_router()
            .oneshot(post("/api/departamentos", Some("token-admin"), "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = payload_of(response).await;
        assert_eq!(payload["error_type"], "Validation");
        let mensaje = payload["field_errors"]["non_field_errors"][0]
            .as_str()
            .unwrap();
        assert!(mensaje.contains("JSON"));
    }

    #[tokio::test]
    async fn test_non_object_body_is_uniform_validation_payload() {
        let response = test_router()
            .oneshot(post("/api/sensores", Some("token-admin"), "[1, 2, 3]"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = payload_of(response).await;
        assert_eq!(payload["error_type"], "Validation");
        assert!(payload["field_errors"]["non_field_errors"][0].is_string());
    }

    #[tokio::test]
    async fn test_unknown_route_returns_uniform_payload() {
        let response = test_router()
            .oneshot(post("/api/usuarios", Some("token-admin"), "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let payload = payload_of(response).await;
        assert_eq!(payload["error_type"], "RouteNotFound");
    }

    #[tokio::test]
    async fn test_admin_creates_departamento() {
        let response = test_router()
            .oneshot(post(
                "/api/departamentos",
                Some("token-admin"),
                r#"{"nombre": "Bodega"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let payload = payload_of(response).await;
        assert_eq!(payload["nombre"], "Bodega");
        assert!(payload["id"].is_number());
    }
}
