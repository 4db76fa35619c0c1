//! Modelos de dominio (filas del dataset de tênis, métricas del modelo y ficheros subidos).

use serde::{Deserialize, Serialize, Serializer};

/// Estilo del tênis (`tenis_estilo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Style {
    #[serde(rename = "ESP")]
    Esp,
    #[serde(rename = "CAS")]
    Cas,
    #[serde(rename = "VIN")]
    Vin,
    #[serde(rename = "SOC")]
    Soc,
    #[serde(rename = "FAS")]
    Fas,
}

impl Style {
    pub const ALL: [Self; 5] = [Self::Esp, Self::Cas, Self::Vin, Self::Soc, Self::Fas];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Esp => "ESP",
            Self::Cas => "CAS",
            Self::Vin => "VIN",
            Self::Soc => "SOC",
            Self::Fas => "FAS",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == code)
    }
}

/// Marca del tênis (`tenis_marca`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Brand {
    Nike,
    Adidas,
    Vans,
    Converse,
    #[serde(rename = "New Balance")]
    NewBalance,
}

impl Brand {
    pub const ALL: [Self; 5] = [
        Self::Nike,
        Self::Adidas,
        Self::Vans,
        Self::Converse,
        Self::NewBalance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nike => "Nike",
            Self::Adidas => "Adidas",
            Self::Vans => "Vans",
            Self::Converse => "Converse",
            Self::NewBalance => "New Balance",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == code)
    }
}

/// Colores predominantes (`tenis_cores`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    #[serde(rename = "BLK")]
    Blk,
    #[serde(rename = "WHT")]
    Wht,
    #[serde(rename = "COL")]
    Col,
    #[serde(rename = "NEU")]
    Neu,
}

impl Color {
    pub const ALL: [Self; 4] = [Self::Blk, Self::Wht, Self::Col, Self::Neu];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blk => "BLK",
            Self::Wht => "WHT",
            Self::Col => "COL",
            Self::Neu => "NEU",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }
}

/// Una línea del CSV tal y como llega, antes de validar.
/// Las celdas ausentes (filas cortas) quedan en `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub tenis_estilo: Option<String>,
    pub tenis_marca: Option<String>,
    pub tenis_cores: Option<String>,
    pub tenis_preco: Option<String>,
    pub match_success: Option<String>,
}

impl RawRow {
    /// Construye la fila a partir de un objeto JSON con los nombres de columna del CSV.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let cell = |name: &str| match value.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        };
        Self {
            tenis_estilo: cell("tenis_estilo"),
            tenis_marca: cell("tenis_marca"),
            tenis_cores: cell("tenis_cores"),
            tenis_preco: cell("tenis_preco"),
            match_success: cell("match_success"),
        }
    }
}

/// Fila del dataset ya validada. También es el registro que acepta `/predict`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRow {
    #[serde(rename = "tenis_estilo")]
    pub style: Style,
    #[serde(rename = "tenis_marca")]
    pub brand: Brand,
    #[serde(rename = "tenis_cores")]
    pub color: Color,
    #[serde(rename = "tenis_preco")]
    pub price: f64,
    #[serde(serialize_with = "bool_as_flag")]
    pub match_success: bool,
}

fn bool_as_flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

/// Interpreta `match_success`: 0/1 o true/false.
pub fn parse_match_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Some(true),
        "0" | "0.0" | "false" => Some(false),
        _ => None,
    }
}

/// Interpreta el precio; sólo se aceptan números finitos.
pub fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

impl RawRow {
    /// Versión tipada de la fila, o `None` si alguna celda no supera la validación.
    pub fn to_typed(&self) -> Option<DatasetRow> {
        fn field(cell: &Option<String>) -> Option<&str> {
            cell.as_deref().map(str::trim)
        }

        Some(DatasetRow {
            style: Style::from_code(field(&self.tenis_estilo)?)?,
            brand: Brand::from_code(field(&self.tenis_marca)?)?,
            color: Color::from_code(field(&self.tenis_cores)?)?,
            price: parse_price(field(&self.tenis_preco)?).filter(|p| *p > 0.0)?,
            match_success: parse_match_flag(field(&self.match_success)?)?,
        })
    }
}

/// Fila de la matriz de confusión tal y como la envía el servicio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrixItem {
    pub name: String,
    pub actual_positive: u64,
    pub actual_negative: u64,
}

/// Punto de la curva ROC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
}

/// Métricas del modelo producidas por el servicio de ML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    #[serde(default)]
    pub confusion_matrix: Vec<ConfusionMatrixItem>,
    #[serde(default)]
    pub roc_curve_data: Vec<RocPoint>,
    #[serde(default)]
    pub training_date: Option<String>,
}

/// Fichero recibido desde la interfaz.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Resultado de `/predict` para un registro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub match_probability: f64,
    pub match_prediction: u8,
    pub confidence_score: f64,
}
