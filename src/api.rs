use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Json, Multipart, State,
    },
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::MutexGuard;
use tracing::info;

use crate::{
    app_state::AppState,
    dashboard::{DashboardState, ExportedFile, UploadReport},
    format::format_error,
    models::{Prediction, UploadFile},
    transport::{ErrorOrigin, NormalizedError},
    validation::{ValidationError, MAX_FILE_SIZE},
};

// Un CSV de hasta cuatro veces el máximo llega entero al validador; por encima se corta
// la lectura y se responde con el mismo error de tamaño.
const UPLOAD_BODY_LIMIT: usize = 4 * MAX_FILE_SIZE as usize;

type ApiError = (StatusCode, Json<Value>);

#[derive(Deserialize)]
pub struct PredictPayload {
    records: Vec<Value>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/panel", get(panel_handler))
        .route("/api/metrics/refresh", post(refresh_metrics_handler))
        .route(
            "/api/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/train", post(train_handler))
        .route("/api/export", post(export_handler))
        .route("/api/predict", post(predict_handler))
        .with_state(app_state)
}

// --- Utilidades de respuesta ---

fn error_response(err: &NormalizedError) -> ApiError {
    let status = match err.origin {
        Some(ErrorOrigin::Client) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": format_error(err), "origin": err.origin })))
}

/// Cuerpo ilegible o con forma incorrecta: mismo formato `{error, origin}` que el resto.
fn bad_request(detail: String) -> ApiError {
    error_response(&NormalizedError::client(detail))
}

/// Error leyendo el multipart; si se pasó del límite del cuerpo, es un archivo demasiado grande.
fn multipart_error(err: MultipartError, headers: &HeaderMap) -> ApiError {
    if err.status() != StatusCode::PAYLOAD_TOO_LARGE {
        return bad_request(format!("No se pudo leer el archivo: {}", err.body_text()));
    }
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(UPLOAD_BODY_LIMIT as u64);
    error_response(&ValidationError::TooLarge { size, limit: MAX_FILE_SIZE }.into())
}

fn busy() -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": "Hay una acción en curso; espera a que termine." })),
    )
}

/// Reserva el panel para una acción; si ya hay otra en curso responde 409.
fn claim(state: &AppState) -> Result<MutexGuard<'_, ()>, ApiError> {
    state.action_gate.try_lock().map_err(|_| busy())
}

// --- Handlers ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<DashboardState> {
    Json(state.dashboard.state())
}

#[axum::debug_handler]
async fn panel_handler(State(state): State<AppState>) -> Response {
    match state.dashboard.panel() {
        Some(panel) => Json(panel).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[axum::debug_handler]
async fn refresh_metrics_handler(
    State(state): State<AppState>,
) -> Result<Json<DashboardState>, ApiError> {
    let _gate = claim(&state)?;
    state
        .dashboard
        .fetch_metrics()
        .await
        .map_err(|e| error_response(&e))?;
    Ok(Json(state.dashboard.state()))
}

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadReport>, ApiError> {
    let mut multipart = multipart
        .map_err(|e| bad_request(format!("No se pudo leer el formulario: {}", e.body_text())))?;
    let _gate = claim(&state)?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, &headers))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, &headers))?;
        file = Some(UploadFile {
            name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let report = state
        .dashboard
        .upload_file(file)
        .await
        .map_err(|e| error_response(&e))?;
    info!("Subida completada: {} ({})", report.file_name, report.size);
    Ok(Json(report))
}

#[axum::debug_handler]
async fn train_handler(State(state): State<AppState>) -> Result<Json<DashboardState>, ApiError> {
    let _gate = claim(&state)?;
    state
        .dashboard
        .train()
        .await
        .map_err(|e| error_response(&e))?;
    Ok(Json(state.dashboard.state()))
}

#[axum::debug_handler]
async fn export_handler(State(state): State<AppState>) -> Result<Json<ExportedFile>, ApiError> {
    let _gate = claim(&state)?;
    let exported = state
        .dashboard
        .export_data()
        .await
        .map_err(|e| error_response(&e))?;
    Ok(Json(exported))
}

#[axum::debug_handler]
async fn predict_handler(
    State(state): State<AppState>,
    payload: Result<Json<PredictPayload>, JsonRejection>,
) -> Result<Json<Vec<Prediction>>, ApiError> {
    let Json(payload) = payload.map_err(|e| bad_request(e.body_text()))?;
    let predictions = state
        .dashboard
        .predict(&payload.records)
        .await
        .map_err(|e| error_response(&e))?;
    Ok(Json(predictions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, transport::ApiClient};
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Levanta el router en un puerto efímero y devuelve su URL base.
    async fn spawn_app(ml_uri: &str) -> String {
        let cfg = AppConfig {
            api_url: Url::parse(ml_uri).unwrap(),
            request_timeout: Duration::from_secs(2),
            ..AppConfig::default()
        };
        let client = ApiClient::new(&cfg).unwrap();
        let app = create_router(AppState::new(cfg, client));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn status_starts_idle_and_panel_is_empty() {
        let ml = MockServer::start().await;
        let base = spawn_app(&ml.uri()).await;

        let status: Value = reqwest::get(format!("{base}/api/status")).await.unwrap().json().await.unwrap();
        assert_eq!(status["state"], "idle");

        let panel = reqwest::get(format!("{base}/api/panel")).await.unwrap();
        assert_eq!(panel.status(), reqwest::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn wrong_format_upload_is_400_and_never_reaches_service() {
        let ml = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/upload-csv"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&ml)
            .await;
        let base = spawn_app(&ml.uri()).await;

        let part = reqwest::multipart::Part::bytes(b"PK\x03\x04".to_vec())
            .file_name("dados.xlsx")
            .mime_str("application/octet-stream")
            .unwrap();
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = reqwest::Client::new()
            .post(format!("{base}/api/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["origin"], "client");
    }

    #[tokio::test]
    async fn eleven_mib_upload_is_rejected_as_too_large() {
        let ml = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/upload-csv"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&ml)
            .await;
        let base = spawn_app(&ml.uri()).await;

        let size = 11 * 1024 * 1024;
        let part = reqwest::multipart::Part::bytes(vec![b'a'; size])
            .file_name("dados.csv")
            .mime_str("text/csv")
            .unwrap();
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = reqwest::Client::new()
            .post(format!("{base}/api/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        let expected = ValidationError::TooLarge { size: size as u64, limit: MAX_FILE_SIZE };
        assert_eq!(body["error"], expected.to_string());
        assert_eq!(body["origin"], "client");
    }

    #[tokio::test]
    async fn malformed_predict_body_is_400_with_error_shape() {
        let ml = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/predict"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&ml)
            .await;
        let base = spawn_app(&ml.uri()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/predict"))
            .json(&json!({"rec": 1}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("records"));
        assert_eq!(body["origin"], "client");
    }

    #[tokio::test]
    async fn service_error_surfaces_as_502_with_detail() {
        let ml = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/metrics"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "Banco indisponível"})))
            .mount(&ml)
            .await;
        let base = spawn_app(&ml.uri()).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/metrics/refresh"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Banco indisponível");
        assert_eq!(body["origin"], "server");

        let status: Value = reqwest::get(format!("{base}/api/status")).await.unwrap().json().await.unwrap();
        assert_eq!(status["state"], "error");
        assert_eq!(status["error"]["message"], "Banco indisponível");
    }
}
