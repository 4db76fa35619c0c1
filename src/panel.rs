//! Modelo de vista del panel de métricas: valores ya formateados, listos para pintar.

use serde::Serialize;

use crate::{
    format::{format_date, format_percent, metric_change, DEFAULT_PERCENT_DECIMALS},
    models::{ConfusionMatrixItem, ModelMetrics, RocPoint},
};

/// Métricas en pantalla: las actuales y, si existen, las del entrenamiento anterior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShownMetrics {
    pub current: ModelMetrics,
    pub previous: Option<ModelMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCard {
    pub label: &'static str,
    pub value: String,
    pub trend: Option<Trend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsPanel {
    pub cards: Vec<MetricCard>,
    pub confusion_matrix: Vec<ConfusionMatrixItem>,
    pub roc_curve: Vec<RocPoint>,
    pub trained_at: Option<String>,
}

impl MetricsPanel {
    pub fn build(shown: &ShownMetrics) -> Self {
        let current = &shown.current;
        let previous = shown.previous.as_ref();

        let scalars: [(&'static str, fn(&ModelMetrics) -> f64); 4] = [
            ("Exactitud", |m| m.accuracy),
            ("Precisión", |m| m.precision),
            ("Recall", |m| m.recall),
            ("F1-Score", |m| m.f1_score),
        ];

        let cards = scalars
            .iter()
            .map(|&(label, get)| MetricCard {
                label,
                value: format_percent(get(current), DEFAULT_PERCENT_DECIMALS),
                trend: metric_change(get(current), previous.map(get)).map(trend),
            })
            .collect();

        // Los puntos fuera de [0, 1] no se pueden dibujar.
        let roc_curve = current
            .roc_curve_data
            .iter()
            .copied()
            .filter(|p| (0.0..=1.0).contains(&p.fpr) && (0.0..=1.0).contains(&p.tpr))
            .collect();

        Self {
            cards,
            confusion_matrix: current.confusion_matrix.clone(),
            roc_curve,
            trained_at: current.training_date.as_deref().map(format_date),
        }
    }
}

fn trend(change: f64) -> Trend {
    Trend {
        direction: if change >= 0.0 { TrendDirection::Up } else { TrendDirection::Down },
        text: format!("{:.1}%", change.abs()),
    }
}
