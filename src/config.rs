//! Carga y gestión de configuración del panel (servicio de ML + servidor local).

use std::{env, path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use url::Url;

/// Prefijo de la API versionada del servicio de ML.
pub const API_PREFIX: &str = "/api/v1";

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Origen del servicio de ML, sin el prefijo `/api/v1`.
    pub api_url: Url,
    pub server_addr: String,
    pub request_timeout: Duration,
    pub export_dir: PathBuf,
    /// Tiempo que un error permanece visible antes de volver a `Idle`.
    pub error_display: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("http://localhost:8000").expect("URL por defecto válida"),
            server_addr: "127.0.0.1:3322".to_string(),
            request_timeout: Duration::from_secs(30),
            export_dir: PathBuf::from("."),
            error_display: Duration::from_secs(5),
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_url = match env::var("API_URL") {
            Ok(raw) => parse_api_url(&raw)?,
            Err(_) => defaults.api_url,
        };

        let server_addr = env::var("SERVER_ADDR").unwrap_or(defaults.server_addr);

        let request_timeout = match env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(parse_positive_secs("REQUEST_TIMEOUT_SECS", &raw)?),
            Err(_) => defaults.request_timeout,
        };

        let error_display = match env::var("ERROR_DISPLAY_SECS") {
            Ok(raw) => Duration::from_secs(parse_positive_secs("ERROR_DISPLAY_SECS", &raw)?),
            Err(_) => defaults.error_display,
        };

        let export_dir = env::var("EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.export_dir);

        Ok(Self {
            api_url,
            server_addr,
            request_timeout,
            export_dir,
            error_display,
        })
    }

    /// URL base de la API: `API_URL` + `/api/v1`.
    pub fn api_base(&self) -> String {
        format!("{}{}", self.api_url.as_str().trim_end_matches('/'), API_PREFIX)
    }
}

fn parse_api_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| anyhow!("API_URL inválida ({raw}): {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("Esquema no soportado en API_URL: {other}")),
    }
}

fn parse_positive_secs(name: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(anyhow!("{name} debe ser mayor que cero")),
        Ok(secs) => Ok(secs),
        Err(e) => Err(anyhow!("{name} no es un número válido ({raw}): {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_appends_versioned_prefix() {
        let cfg = AppConfig {
            api_url: parse_api_url("http://ml.local:8000/").unwrap(),
            ..AppConfig::default()
        };
        assert_eq!(cfg.api_base(), "http://ml.local:8000/api/v1");
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(parse_api_url("ftp://ml.local").is_err());
        assert!(parse_api_url("no es una url").is_err());
    }

    #[test]
    fn timeouts_must_be_positive() {
        assert!(parse_positive_secs("REQUEST_TIMEOUT_SECS", "0").is_err());
        assert!(parse_positive_secs("REQUEST_TIMEOUT_SECS", "abc").is_err());
        assert_eq!(parse_positive_secs("REQUEST_TIMEOUT_SECS", " 12 ").unwrap(), 12);
    }
}
