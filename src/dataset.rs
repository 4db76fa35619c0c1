//! Lectura del CSV subido por el usuario.
//!
//! La cabecera se lee primero para que el esquema de columnas se valide antes de
//! recorrer las filas; las filas se leen sólo si la cabecera es correcta.

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::{
    models::{DatasetRow, RawRow},
    validation::{validate_columns, ValidationError},
};

/// CSV en memoria con la cabecera ya leída.
pub struct CsvDataset<'a> {
    bytes: &'a [u8],
    headers: Vec<String>,
}

impl<'a> CsvDataset<'a> {
    /// Lee sólo la cabecera.
    pub fn open(bytes: &'a [u8]) -> Result<Self, ValidationError> {
        let mut reader = reader_for(bytes);
        let headers = reader
            .headers()
            .map_err(|e| ValidationError::MalformedCsv(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        Ok(Self { bytes, headers })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Comprueba el esquema y, si es correcto, lee todas las filas.
    pub fn rows(&self) -> Result<Vec<RawRow>, ValidationError> {
        validate_columns(&self.headers)?;

        let column = |name: &str| self.headers.iter().position(|h| h == name);
        let idx = [
            column("tenis_estilo"),
            column("tenis_marca"),
            column("tenis_cores"),
            column("tenis_preco"),
            column("match_success"),
        ];

        let mut reader = reader_for(self.bytes);
        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                ValidationError::MalformedCsv(format!("fila {}: {e}", line + 1))
            })?;
            let cell = |i: Option<usize>| cell_at(&record, i);
            rows.push(RawRow {
                tenis_estilo: cell(idx[0]),
                tenis_marca: cell(idx[1]),
                tenis_cores: cell(idx[2]),
                tenis_preco: cell(idx[3]),
                match_success: cell(idx[4]),
            });
        }
        Ok(rows)
    }
}

fn reader_for(bytes: &[u8]) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes)
}

fn cell_at(record: &StringRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| record.get(i))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resumen de un dataset ya validado.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub rows: usize,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub matches: usize,
}

pub fn summarize(rows: &[RawRow]) -> DatasetSummary {
    let typed: Vec<DatasetRow> = rows
        .iter()
        .filter_map(RawRow::to_typed)
        .collect();

    DatasetSummary {
        rows: rows.len(),
        min_price: typed.iter().map(|r| r.price).reduce(f64::min),
        max_price: typed.iter().map(|r| r.price).reduce(f64::max),
        matches: typed.iter().filter(|r| r.match_success).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
id,tenis_estilo,tenis_marca,tenis_cores,tenis_preco,match_success
1,ESP,Nike,BLK,299.99,1
2, CAS , New Balance ,WHT,150,0
";

    #[test]
    fn reads_rows_by_header_name_with_extra_columns() {
        let dataset = CsvDataset::open(GOOD.as_bytes()).unwrap();
        assert_eq!(dataset.headers().len(), 6);

        let rows = dataset.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].tenis_estilo.as_deref(), Some("CAS"));
        assert_eq!(rows[1].tenis_marca.as_deref(), Some("New Balance"));
        assert_eq!(rows[0].tenis_preco.as_deref(), Some("299.99"));
    }

    #[test]
    fn rows_are_not_read_when_columns_are_missing() {
        let csv = "tenis_estilo,tenis_marca,tenis_cores,match_success\nESP,Nike,BLK,1\n";
        let dataset = CsvDataset::open(csv.as_bytes()).unwrap();
        assert_eq!(
            dataset.rows(),
            Err(ValidationError::MissingColumns(vec!["tenis_preco".into()]))
        );
    }

    #[test]
    fn short_rows_leave_cells_empty() {
        let csv = "tenis_estilo,tenis_marca,tenis_cores,tenis_preco,match_success\nESP,Nike\n";
        let rows = CsvDataset::open(csv.as_bytes()).unwrap().rows().unwrap();
        assert_eq!(rows[0].tenis_marca.as_deref(), Some("Nike"));
        assert_eq!(rows[0].tenis_cores, None);
        assert_eq!(rows[0].match_success, None);
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut bytes = b"tenis_estilo,tenis_marca,tenis_cores,tenis_preco,match_success\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b',', b'\n']);
        let dataset = CsvDataset::open(&bytes).unwrap();
        assert!(matches!(dataset.rows(), Err(ValidationError::MalformedCsv(_))));
    }

    #[test]
    fn summary_covers_valid_rows() {
        let rows = CsvDataset::open(GOOD.as_bytes()).unwrap().rows().unwrap();
        let summary = summarize(&rows);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.min_price, Some(150.0));
        assert_eq!(summary.max_price, Some(299.99));
        assert_eq!(summary.matches, 1);
    }
}
