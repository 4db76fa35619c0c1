//! Validación en capas del lado cliente: fichero → esquema de columnas → contenido de filas,
//! más la compuerta de visualización de métricas recibidas del servicio.
//!
//! Nada aquí hace E/S ni lanza pánicos: los fallos se devuelven como datos.

use std::{collections::BTreeMap, fmt};

use mime_guess::MimeGuess;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{parse_match_flag, parse_price, Brand, Color, RawRow, Style, UploadFile};

/// Tamaño máximo de subida: 10 MiB.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Columnas obligatorias, en su orden canónico.
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "tenis_estilo",
    "tenis_marca",
    "tenis_cores",
    "tenis_preco",
    "match_success",
];

/// Métricas escalares que deben venir en todo payload de métricas.
pub const REQUIRED_METRICS: [&str; 4] = ["accuracy", "precision", "recall", "f1_score"];

const CSV_MIME_TYPES: [&str; 6] = [
    "text/csv",
    "application/csv",
    "text/x-csv",
    "application/x-csv",
    "text/comma-separated-values",
    "application/vnd.ms-excel",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Ningún archivo seleccionado")]
    EmptyInput,
    #[error("Formato inválido. Sólo se aceptan archivos CSV")]
    WrongFormat,
    #[error("Archivo demasiado grande ({size} bytes). Tamaño máximo: {limit} bytes (10MB)")]
    TooLarge { size: u64, limit: u64 },
    #[error("Faltan columnas obligatorias: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("CSV mal formado: {0}")]
    MalformedCsv(String),
    #[error("Datos inválidos en el CSV. {0}")]
    InvalidRows(DatasetValidationResult),
}

/// Campo de una fila del dataset, en el orden fijo de comprobación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Field {
    Style,
    Brand,
    Color,
    Price,
    MatchSuccess,
}

impl Field {
    pub fn column(self) -> &'static str {
        match self {
            Self::Style => "tenis_estilo",
            Self::Brand => "tenis_marca",
            Self::Color => "tenis_cores",
            Self::Price => "tenis_preco",
            Self::MatchSuccess => "match_success",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: Field,
    pub message: &'static str,
}

/// Errores de una fila, en el orden en que se comprobaron. Vacío = fila válida.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowErrors(Vec<FieldError>);

impl RowErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, field: Field, message: &'static str) {
        self.0.push(FieldError { field, message });
    }
}

impl fmt::Display for RowErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{} ({})", e.field.column(), e.message))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Informe de validación de un dataset completo, indexado por fila (base 1).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetValidationResult {
    pub rows_checked: usize,
    pub errors: BTreeMap<usize, RowErrors>,
}

impl DatasetValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for DatasetValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(f, "{} filas válidas", self.rows_checked);
        }
        let rows: Vec<String> = self
            .errors
            .iter()
            .map(|(row, errs)| format!("Fila {row}: {errs}"))
            .collect();
        write!(
            f,
            "{} de {} filas con errores. {}",
            self.errors.len(),
            self.rows_checked,
            rows.join("; ")
        )
    }
}

/// Comprueba presencia, formato CSV (tipo declarado o extensión) y tamaño del fichero.
pub fn validate_file(file: Option<&UploadFile>) -> Result<(), ValidationError> {
    let file = file.ok_or(ValidationError::EmptyInput)?;

    if !declared_as_csv(file.content_type.as_deref()) && !named_as_csv(&file.name) {
        return Err(ValidationError::WrongFormat);
    }

    if file.size() > MAX_FILE_SIZE {
        return Err(ValidationError::TooLarge {
            size: file.size(),
            limit: MAX_FILE_SIZE,
        });
    }

    Ok(())
}

fn declared_as_csv(content_type: Option<&str>) -> bool {
    let Some(raw) = content_type else {
        return false;
    };
    let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    CSV_MIME_TYPES.contains(&essence.as_str())
}

fn named_as_csv(name: &str) -> bool {
    MimeGuess::from_path(name)
        .iter()
        .any(|mime| mime.subtype() == mime_guess::mime::CSV)
}

/// Lista todas las columnas obligatorias ausentes, en orden canónico.
/// Las columnas extra se toleran.
pub fn validate_columns<S: AsRef<str>>(headers: &[S]) -> Result<(), ValidationError> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !headers.iter().any(|h| h.as_ref().trim() == **required))
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingColumns(missing))
    }
}

/// Valida una fila: estilo, marca, color, precio y `match_success`, siempre en ese orden.
pub fn validate_row(row: &RawRow) -> RowErrors {
    fn cell(value: &Option<String>) -> &str {
        value.as_deref().map(str::trim).unwrap_or("")
    }

    let mut errors = RowErrors::default();

    if Style::from_code(cell(&row.tenis_estilo)).is_none() {
        errors.push(Field::Style, "Estilo inválido");
    }
    if Brand::from_code(cell(&row.tenis_marca)).is_none() {
        errors.push(Field::Brand, "Marca inválida");
    }
    if Color::from_code(cell(&row.tenis_cores)).is_none() {
        errors.push(Field::Color, "Color inválido");
    }
    if !parse_price(cell(&row.tenis_preco)).is_some_and(|p| p > 0.0) {
        errors.push(Field::Price, "El precio debe ser mayor que cero");
    }
    if parse_match_flag(cell(&row.match_success)).is_none() {
        errors.push(Field::MatchSuccess, "match_success debe ser 0 o 1");
    }

    errors
}

/// Valida todas las filas, sin cortocircuito, para poder mostrar el informe completo.
pub fn validate_dataset(rows: &[RawRow]) -> DatasetValidationResult {
    let errors = rows
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let row_errors = validate_row(row);
            (!row_errors.is_empty()).then_some((index + 1, row_errors))
        })
        .collect();

    DatasetValidationResult {
        rows_checked: rows.len(),
        errors,
    }
}

/// Compuerta de visualización: las cuatro métricas escalares presentes, numéricas y en [0, 1].
pub fn validate_metrics(metrics: Option<&Value>) -> bool {
    let Some(Value::Object(map)) = metrics else {
        return false;
    };

    REQUIRED_METRICS.iter().all(|name| {
        map.get(*name)
            .and_then(Value::as_f64)
            .is_some_and(|v| (0.0..=1.0).contains(&v))
    })
}
