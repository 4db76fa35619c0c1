//! Cliente HTTP del servicio de ML (`/api/v1`).
//!
//! Todo fallo (conexión, timeout, estado HTTP de error con o sin cuerpo, payload
//! ilegible) sale de aquí como un único `NormalizedError`. No hay reintentos.

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    format::ErrorLike,
    models::{DatasetRow, Prediction, UploadFile},
    validation::ValidationError,
};

pub const NETWORK_ERROR_MESSAGE: &str = "No se pudo conectar con el servidor";
pub const GENERIC_ERROR_MESSAGE: &str = "Ocurrió un error en la solicitud";
pub const MALFORMED_RESPONSE_MESSAGE: &str = "Respuesta inválida del servidor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    Network,
    Server,
    Client,
}

/// La única forma de error que ve el resto del sistema.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{message}")]
pub struct NormalizedError {
    pub message: String,
    pub origin: Option<ErrorOrigin>,
}

impl NormalizedError {
    pub fn network() -> Self {
        Self {
            message: NETWORK_ERROR_MESSAGE.to_string(),
            origin: Some(ErrorOrigin::Network),
        }
    }

    pub fn server<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            origin: Some(ErrorOrigin::Server),
        }
    }

    pub fn client<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            origin: Some(ErrorOrigin::Client),
        }
    }
}

impl From<ValidationError> for NormalizedError {
    fn from(err: ValidationError) -> Self {
        Self::client(err.to_string())
    }
}

impl ErrorLike for NormalizedError {
    fn message(&self) -> Option<String> {
        Some(self.message.clone())
    }
}

/// Mensaje de un cuerpo de error: `detail` primero, luego `message`.
/// `detail` puede ser texto o la lista `[{loc, msg, type}]` de los errores 422.
pub fn message_from_error_body(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;

    let detail = match value.get("detail") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        _ => None,
    };

    detail
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            value
                .get("message")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        })
}

/// Respuesta con estado de error.
pub fn normalize_status(status: StatusCode, body: &[u8]) -> NormalizedError {
    let message = message_from_error_body(body).unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
    warn!(status = status.as_u16(), %message, "El servicio de ML respondió con error");
    NormalizedError::server(message)
}

/// Fallo antes de recibir respuesta alguna (conexión, timeout, DNS...).
pub fn normalize_send_error(err: &reqwest::Error) -> NormalizedError {
    if err.is_builder() {
        warn!(error = %err, "Petición mal construida");
        return NormalizedError::client(GENERIC_ERROR_MESSAGE);
    }
    warn!(error = %err, timeout = err.is_timeout(), "Sin respuesta del servicio de ML");
    NormalizedError::network()
}

/// Fallo leyendo o decodificando un cuerpo de respuesta correcta.
fn normalize_body_error(err: &reqwest::Error) -> NormalizedError {
    if err.is_timeout() {
        warn!(error = %err, "Timeout leyendo la respuesta");
        return NormalizedError::network();
    }
    warn!(error = %err, "No se pudo leer la respuesta");
    NormalizedError::server(MALFORMED_RESPONSE_MESSAGE)
}

/// Operaciones del servicio de ML que consume el panel.
#[async_trait]
pub trait MlApi: Send + Sync {
    /// Historial de métricas, más reciente primero. Sin validar.
    async fn get_metrics(&self) -> Result<Vec<Value>, NormalizedError>;
    async fn upload_csv(&self, file: &UploadFile) -> Result<Value, NormalizedError>;
    async fn export_csv(&self) -> Result<Vec<u8>, NormalizedError>;
    /// Métricas del entrenamiento recién hecho. Sin validar.
    async fn train(&self) -> Result<Value, NormalizedError>;
    async fn predict(&self, records: &[DatasetRow]) -> Result<Vec<Prediction>, NormalizedError>;
}

/// Cliente construido a partir de la configuración; no hay estado global.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    pub fn new(cfg: &AppConfig) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(cfg.request_timeout).build()?;
        Ok(Self {
            http,
            base: cfg.api_base(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Envía la petición y convierte cualquier estado no 2xx en `NormalizedError`.
    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<Response, NormalizedError> {
        debug!(%path, "Llamando al servicio de ML");
        let response = request.send().await.map_err(|e| normalize_send_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(normalize_status(status, &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T, NormalizedError> {
        self.execute(request, path)
            .await?
            .json::<T>()
            .await
            .map_err(|e| normalize_body_error(&e))
    }
}

#[async_trait]
impl MlApi for ApiClient {
    async fn get_metrics(&self) -> Result<Vec<Value>, NormalizedError> {
        let path = "/metrics";
        self.json(self.http.get(self.url(path)), path).await
    }

    async fn upload_csv(&self, file: &UploadFile) -> Result<Value, NormalizedError> {
        let path = "/upload-csv";
        let mime = file.content_type.as_deref().unwrap_or("text/csv");
        let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        let part = match part.mime_str(mime) {
            Ok(part) => part,
            Err(_) => multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone()),
        };
        let form = multipart::Form::new().part("file", part);

        let response = self
            .execute(self.http.post(self.url(path)).multipart(form), path)
            .await?;
        let body = response.bytes().await.map_err(|e| normalize_body_error(&e))?;
        // El payload de éxito es opaco; si no es JSON se conserva como texto.
        Ok(serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned())))
    }

    async fn export_csv(&self) -> Result<Vec<u8>, NormalizedError> {
        let path = "/export-csv";
        let response = self.execute(self.http.get(self.url(path)), path).await?;
        let body = response.bytes().await.map_err(|e| normalize_body_error(&e))?;
        Ok(body.to_vec())
    }

    async fn train(&self) -> Result<Value, NormalizedError> {
        let path = "/train";
        self.json(self.http.post(self.url(path)), path).await
    }

    async fn predict(&self, records: &[DatasetRow]) -> Result<Vec<Prediction>, NormalizedError> {
        let path = "/predict";
        let body = json!({ "records": records });
        self.json(self.http.post(self.url(path)).json(&body), path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Brand, Color, Style};
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(uri: &str, timeout: Duration) -> ApiClient {
        let cfg = AppConfig {
            api_url: Url::parse(uri).unwrap(),
            request_timeout: timeout,
            ..AppConfig::default()
        };
        ApiClient::new(&cfg).unwrap()
    }

    async fn mock_client(server: &MockServer) -> ApiClient {
        client_for(&server.uri(), Duration::from_secs(5))
    }

    #[test]
    fn body_precedence_detail_then_message() {
        let both = br#"{"detail": "Arquivo deve ser CSV", "message": "otro"}"#;
        assert_eq!(message_from_error_body(both).as_deref(), Some("Arquivo deve ser CSV"));

        let only_message = br#"{"message": "Falha interna"}"#;
        assert_eq!(message_from_error_body(only_message).as_deref(), Some("Falha interna"));

        let list = br#"{"detail": [{"loc": ["body"], "msg": "field required"}, {"msg": "value is not a valid float"}]}"#;
        assert_eq!(
            message_from_error_body(list).as_deref(),
            Some("field required; value is not a valid float")
        );

        assert_eq!(message_from_error_body(b"<html>502</html>"), None);
        assert_eq!(message_from_error_body(br#"{"detail": ""}"#), None);
    }

    #[tokio::test]
    async fn metrics_pass_through_unchanged() {
        let server = MockServer::start().await;
        let payload = json!([{"accuracy": 0.9, "precision": 0.8, "recall": 0.85, "f1_score": 0.82}]);
        Mock::given(method("GET"))
            .and(path("/api/v1/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let metrics = mock_client(&server).await.get_metrics().await.unwrap();
        assert_eq!(Value::Array(metrics), payload);
    }

    #[tokio::test]
    async fn server_detail_becomes_the_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/train"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "detail": "Dados insuficientes para treinamento (mínimo 100 registros)"
            })))
            .mount(&server)
            .await;

        let err = mock_client(&server).await.train().await.unwrap_err();
        assert_eq!(err.origin, Some(ErrorOrigin::Server));
        assert_eq!(err.message, "Dados insuficientes para treinamento (mínimo 100 registros)");
    }

    #[tokio::test]
    async fn unparseable_error_body_falls_back_to_generic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/export-csv"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = mock_client(&server).await.export_csv().await.unwrap_err();
        assert_eq!(err, NormalizedError::server(GENERIC_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn malformed_success_payload_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = mock_client(&server).await.get_metrics().await.unwrap_err();
        assert_eq!(err, NormalizedError::server(MALFORMED_RESPONSE_MESSAGE));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        // Puerto libre que nadie escucha.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = client_for(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2));
        let err = client.get_metrics().await.unwrap_err();
        assert_eq!(err, NormalizedError::network());
        assert_eq!(err.message, NETWORK_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn timeout_maps_to_network_branch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/metrics"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Duration::from_millis(200));
        let err = client.get_metrics().await.unwrap_err();
        assert_eq!(err.origin, Some(ErrorOrigin::Network));
    }

    #[tokio::test]
    async fn upload_sends_multipart_file_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/upload-csv"))
            .and(body_string_contains("name=\"file\""))
            .and(body_string_contains("filename=\"dados.csv\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Importados 1 registros com sucesso"})))
            .expect(1)
            .mount(&server)
            .await;

        let file = UploadFile {
            name: "dados.csv".into(),
            content_type: Some("text/csv".into()),
            bytes: b"tenis_estilo\nESP\n".to_vec(),
        };
        let payload = mock_client(&server).await.upload_csv(&file).await.unwrap();
        assert_eq!(payload["message"], "Importados 1 registros com sucesso");
    }

    #[tokio::test]
    async fn predict_wraps_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/predict"))
            .and(body_json(json!({"records": [{
                "tenis_estilo": "CAS", "tenis_marca": "Adidas", "tenis_cores": "WHT",
                "tenis_preco": 199.9, "match_success": 0
            }]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"match_probability": 0.7, "match_prediction": 1, "confidence_score": 0.7}
            ])))
            .mount(&server)
            .await;

        let records = [DatasetRow {
            style: Style::Cas,
            brand: Brand::Adidas,
            color: Color::Wht,
            price: 199.9,
            match_success: false,
        }];
        let predictions = mock_client(&server).await.predict(&records).await.unwrap();
        assert_eq!(predictions[0].match_prediction, 1);
    }
}
