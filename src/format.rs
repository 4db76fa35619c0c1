//! Funciones puras de presentación: porcentajes, moneda, fechas, tamaños y nombres de fichero.
//! Todas son totales; una entrada extraña produce un texto, nunca un pánico.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};

pub const DEFAULT_PERCENT_DECIMALS: usize = 1;
pub const DEFAULT_FILE_NAME_LENGTH: usize = 20;
pub const FALLBACK_ERROR_MESSAGE: &str = "Ocurrió un error inesperado";
pub const INVALID_DATE: &str = "Fecha inválida";

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
const ELLIPSIS: &str = "...";

/// `0.873` → `"87.3%"`.
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Moneda en formato pt-BR: `1234.5` → `"R$ 1.234,50"` (con espacio no separable).
pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return format!("R$\u{a0}{value}");
    }

    let cents = (value.abs() * 100.0).round() as u128;
    let (units, cents) = (cents / 100, cents % 100);

    let digits = units.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && (units > 0 || cents > 0) { "-" } else { "" };
    format!("{sign}R$\u{a0}{grouped},{cents:02}")
}

/// Fecha ISO-8601 a fecha y hora local (`dd/mm/aaaa, hh:mm`).
pub fn format_date(iso: &str) -> String {
    format_date_in(iso, &Local)
}

/// Igual que [`format_date`] pero en una zona horaria concreta.
/// Las fechas sin desplazamiento se interpretan como hora de esa zona, y las
/// fechas sin hora como su medianoche.
pub fn format_date_in<Tz: TimeZone>(iso: &str, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match parse_instant(iso, tz) {
        Some(dt) => dt.format("%d/%m/%Y, %H:%M").to_string(),
        None => INVALID_DATE.to_string(),
    }
}

// RFC 3339 y sus variantes ISO-8601 sin segundos; luego las mismas sin desplazamiento.
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

fn parse_instant<Tz: TimeZone>(iso: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    // "2024-03-05 15:30" es la misma fecha que "2024-03-05T15:30".
    let iso = iso.trim().replacen(' ', "T", 1);

    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|f| DateTime::parse_from_str(&iso, f).ok())
    {
        return Some(dt.with_timezone(tz));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(&iso, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&iso, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    tz.from_local_datetime(&naive).earliest()
}

/// Bytes a la mayor unidad (hasta GB) cuyo valor sea ≥ 1, con hasta dos decimales.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", SIZE_UNITS[unit])
}

/// Acorta un nombre de fichero conservando siempre la extensión.
pub fn format_file_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        return name.to_string();
    }

    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let keep = max_len.saturating_sub(ext.chars().count() + ELLIPSIS.len());
            let truncated: String = stem.chars().take(keep).collect();
            format!("{truncated}{ELLIPSIS}{ext}")
        }
        _ => {
            let truncated: String = name.chars().take(max_len.saturating_sub(ELLIPSIS.len())).collect();
            format!("{truncated}{ELLIPSIS}")
        }
    }
}

/// Cualquier cosa que pueda mostrarse como error al usuario.
pub trait ErrorLike {
    /// Mensaje de detalle enviado por el servidor, si lo hay.
    fn server_detail(&self) -> Option<String> {
        None
    }

    fn message(&self) -> Option<String>;
}

/// Detalle del servidor, luego el mensaje, luego un texto fijo.
pub fn format_error<E: ErrorLike + ?Sized>(error: &E) -> String {
    error
        .server_detail()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| error.message().filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string())
}

/// Variación porcentual respecto al valor anterior.
pub fn metric_change(current: f64, previous: Option<f64>) -> Option<f64> {
    previous
        .filter(|p| *p != 0.0 && p.is_finite())
        .map(|p| (current - p) / p * 100.0)
}
