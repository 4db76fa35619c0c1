//! Orquestador del panel: subir → validar → enviar → pedir métricas → mostrar.
//!
//! Es el único componente con estado. El estado vive tras un `Mutex` que nunca se
//! mantiene a través de un `.await`, así que `/api/status` ve `Loading` mientras
//! hay una llamada en curso. Se asume invocación en serie: la capa HTTP reserva el
//! panel con `AppState::action_gate` y rechaza con 409 las acciones concurrentes.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dataset::{summarize, CsvDataset},
    format::{format_currency, format_file_name, format_file_size, DEFAULT_FILE_NAME_LENGTH},
    models::{DatasetRow, ModelMetrics, Prediction, RawRow, UploadFile},
    panel::{MetricsPanel, ShownMetrics},
    transport::{MlApi, NormalizedError},
    validation::{validate_dataset, validate_file, validate_metrics, ValidationError},
};

/// Nombre con el que se guarda la exportación.
pub const EXPORT_FILE_NAME: &str = "tenis_match_data.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    FetchMetrics,
    Upload,
    Train,
    Export,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DashboardState {
    Idle,
    Loaded {
        shown: ShownMetrics,
    },
    Loading {
        action: Action,
        shown: Option<ShownMetrics>,
    },
    Error {
        error: NormalizedError,
        shown: Option<ShownMetrics>,
    },
}

impl DashboardState {
    pub fn shown(&self) -> Option<&ShownMetrics> {
        match self {
            Self::Idle => None,
            Self::Loaded { shown } => Some(shown),
            Self::Loading { shown, .. } | Self::Error { shown, .. } => shown.as_ref(),
        }
    }

    /// Estado de reposo: con métricas si hay algo que mostrar.
    fn settled(shown: Option<ShownMetrics>) -> Self {
        match shown {
            Some(shown) => Self::Loaded { shown },
            None => Self::Idle,
        }
    }
}

/// Resumen devuelto tras una subida correcta.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub file_name: String,
    pub size: String,
    pub rows: usize,
    pub server_message: Option<String>,
}

/// Fichero guardado por `export_data`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub size: String,
}

/// Qué se obtuvo al pedir el historial de métricas.
enum MetricsOutcome {
    Fresh(ShownMetrics),
    Empty,
    Rejected,
}

struct Inner {
    state: DashboardState,
    // Identifica el error vigente para que un temporizador viejo no borre uno nuevo.
    error_epoch: u64,
}

pub struct Dashboard<A> {
    api: A,
    inner: Arc<Mutex<Inner>>,
    export_dir: PathBuf,
    error_display: Duration,
}

impl<A: MlApi> Dashboard<A> {
    pub fn new(api: A, cfg: &AppConfig) -> Self {
        Self {
            api,
            inner: Arc::new(Mutex::new(Inner {
                state: DashboardState::Idle,
                error_epoch: 0,
            })),
            export_dir: cfg.export_dir.clone(),
            error_display: cfg.error_display,
        }
    }

    pub fn state(&self) -> DashboardState {
        self.lock().state.clone()
    }

    /// Panel listo para pintar, o `None` si no hay métricas válidas.
    pub fn panel(&self) -> Option<MetricsPanel> {
        self.lock().state.shown().map(MetricsPanel::build)
    }

    /// `Idle → Loading → Loaded | Idle`, o `Loading → Error`.
    pub async fn fetch_metrics(&self) -> Result<(), NormalizedError> {
        self.begin(Action::FetchMetrics);
        match self.load_metrics().await {
            Ok(outcome) => {
                self.apply_metrics(outcome);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Valida el fichero por completo antes de cualquier llamada de red.
    /// Un fallo de validación no toca el estado; se devuelve de inmediato.
    pub async fn upload_file(&self, file: Option<UploadFile>) -> Result<UploadReport, NormalizedError> {
        validate_file(file.as_ref()).map_err(reject)?;
        let file = file.ok_or_else(|| reject(ValidationError::EmptyInput))?;

        let dataset = CsvDataset::open(&file.bytes).map_err(reject)?;
        let rows = dataset.rows().map_err(reject)?;
        let report = validate_dataset(&rows);
        if !report.is_valid() {
            return Err(reject(ValidationError::InvalidRows(report)));
        }

        let summary = summarize(&rows);
        info!(
            file = %file.name,
            columns = dataset.headers().len(),
            rows = summary.rows,
            matches = summary.matches,
            min_price = %summary.min_price.map(format_currency).unwrap_or_default(),
            max_price = %summary.max_price.map(format_currency).unwrap_or_default(),
            "Dataset validado, enviando al servicio"
        );

        self.begin(Action::Upload);
        let payload = match self.api.upload_csv(&file).await {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail(err)),
        };

        match self.load_metrics().await {
            Ok(outcome) => self.apply_metrics(outcome),
            Err(err) => return Err(self.fail(err)),
        }

        let server_message = match &payload {
            Value::String(s) => Some(s.clone()),
            other => other.get("message").and_then(Value::as_str).map(str::to_string),
        };

        Ok(UploadReport {
            file_name: format_file_name(&file.name, DEFAULT_FILE_NAME_LENGTH),
            size: format_file_size(file.size()),
            rows: summary.rows,
            server_message,
        })
    }

    /// Entrena y sustituye las métricas mostradas por las recién devueltas.
    pub async fn train(&self) -> Result<(), NormalizedError> {
        let before = self.begin(Action::Train);
        let fresh = match self.api.train().await {
            Ok(value) => value,
            Err(err) => return Err(self.fail(err)),
        };

        let shown = gate_metrics(&fresh).map(|current| ShownMetrics {
            current,
            previous: before.map(|b| b.current),
        });
        self.settle(shown);
        Ok(())
    }

    /// Descarga el CSV y lo guarda en disco; no cambia las métricas mostradas.
    pub async fn export_data(&self) -> Result<ExportedFile, NormalizedError> {
        let before = self.begin(Action::Export);
        let bytes = match self.api.export_csv().await {
            Ok(bytes) => bytes,
            Err(err) => return Err(self.fail(err)),
        };

        let path = self.export_dir.join(EXPORT_FILE_NAME);
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            warn!(path = %path.display(), error = %e, "No se pudo guardar la exportación");
            return Err(self.fail(NormalizedError::client(format!(
                "No se pudo guardar el archivo {EXPORT_FILE_NAME}: {e}"
            ))));
        }

        info!(path = %path.display(), bytes = bytes.len(), "Exportación guardada");
        self.settle(before);
        Ok(ExportedFile {
            path,
            size: format_file_size(bytes.len() as u64),
        })
    }

    /// Predicción para registros externos. No pasa por `Loading`: no toca lo mostrado.
    pub async fn predict(&self, records: &[Value]) -> Result<Vec<Prediction>, NormalizedError> {
        let raw: Vec<RawRow> = records.iter().map(RawRow::from_json).collect();
        let report = validate_dataset(&raw);
        if !report.is_valid() {
            return Err(reject(ValidationError::InvalidRows(report)));
        }

        let rows: Vec<DatasetRow> = raw.iter().filter_map(RawRow::to_typed).collect();
        self.api.predict(&rows).await
    }

    async fn load_metrics(&self) -> Result<MetricsOutcome, NormalizedError> {
        let history = self.api.get_metrics().await?;
        let Some(latest) = history.first() else {
            return Ok(MetricsOutcome::Empty);
        };
        let Some(current) = gate_metrics(latest) else {
            return Ok(MetricsOutcome::Rejected);
        };
        let previous = history
            .get(1)
            .filter(|v| validate_metrics(Some(*v)))
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        Ok(MetricsOutcome::Fresh(ShownMetrics { current, previous }))
    }

    fn apply_metrics(&self, outcome: MetricsOutcome) {
        match outcome {
            MetricsOutcome::Fresh(shown) => self.settle(Some(shown)),
            MetricsOutcome::Empty => {
                let kept = self.lock().state.shown().cloned();
                self.settle(kept);
            }
            MetricsOutcome::Rejected => self.settle(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pasa a `Loading` y devuelve lo que se estaba mostrando.
    fn begin(&self, action: Action) -> Option<ShownMetrics> {
        let mut inner = self.lock();
        let shown = inner.state.shown().cloned();
        inner.state = DashboardState::Loading {
            action,
            shown: shown.clone(),
        };
        info!(?action, "Acción iniciada");
        shown
    }

    fn settle(&self, shown: Option<ShownMetrics>) {
        let mut inner = self.lock();
        inner.state = DashboardState::settled(shown);
        info!(metrics = inner.state.shown().is_some(), "Acción completada");
    }

    /// Pasa a `Error` y programa la vuelta a reposo sin bloquear al llamador.
    fn fail(&self, error: NormalizedError) -> NormalizedError {
        let epoch = {
            let mut inner = self.lock();
            let shown = inner.state.shown().cloned();
            inner.error_epoch += 1;
            inner.state = DashboardState::Error {
                error: error.clone(),
                shown,
            };
            inner.error_epoch
        };
        warn!(origin = ?error.origin, message = %error.message, "Acción fallida");

        let inner = Arc::clone(&self.inner);
        let display = self.error_display;
        tokio::spawn(async move {
            tokio::time::sleep(display).await;
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.error_epoch != epoch {
                return;
            }
            if let DashboardState::Error { shown, .. } = &mut inner.state {
                let shown = shown.take();
                inner.state = DashboardState::settled(shown);
            }
        });

        error
    }
}

/// Compuerta de visualización: métricas no válidas no se muestran, pero tampoco rompen nada.
fn gate_metrics(value: &Value) -> Option<ModelMetrics> {
    if !validate_metrics(Some(value)) {
        warn!("Métricas recibidas fuera de rango o incompletas; no se mostrarán");
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            warn!(error = %e, "Métricas con forma inesperada; no se mostrarán");
            None
        }
    }
}

fn reject(err: ValidationError) -> NormalizedError {
    info!(error = %err, "Validación local fallida; no se contacta al servidor");
    NormalizedError::from(err)
}
