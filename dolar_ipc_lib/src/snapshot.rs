//! Snapshot files: the locally persisted copy of one fetch result.
//!
//! A snapshot is comma-delimited, has no header and always carries the eight
//! canonical columns in [`Column::ALL`] order. Indicators a source does not
//! provide are written as empty fields.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use datosgob_api::types::{Column, SeriesPayload};
use serde_json::Value;

use crate::error::PipelineError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One observation date with its seven indicator values.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub fecha: NaiveDate,
    /// Indexed by [`Column::indicator_index`].
    pub values: [Option<f64>; 7],
}

impl SnapshotRow {
    pub fn new(fecha: NaiveDate) -> Self {
        Self {
            fecha,
            values: [None; 7],
        }
    }

    pub fn with(mut self, column: Column, value: f64) -> Self {
        if let Some(i) = column.indicator_index() {
            self.values[i] = Some(value);
        }
        self
    }

    pub fn get(&self, column: Column) -> Option<f64> {
        column.indicator_index().and_then(|i| self.values[i])
    }

    fn to_record(&self) -> Vec<String> {
        let mut record = Vec::with_capacity(Column::ALL.len());
        record.push(self.fecha.format(DATE_FORMAT).to_string());
        record.extend(
            self.values
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        record
    }
}

/// Rows sorted by date, at most one per date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    rows: Vec<SnapshotRow>,
}

impl Snapshot {
    /// Sorts `rows` by date. Returns the offending date if one repeats.
    pub fn new(mut rows: Vec<SnapshotRow>) -> Result<Self, NaiveDate> {
        rows.sort_by_key(|r| r.fecha);
        if let Some(pair) = rows.windows(2).find(|w| w[0].fecha == w[1].fecha) {
            return Err(pair[0].fecha);
        }
        Ok(Self { rows })
    }

    /// Shapes the API payload into canonical rows.
    ///
    /// `columns` names what each payload row carries, `Fecha` first. Rows may
    /// be positional arrays or records keyed by column name.
    pub fn from_payload(payload: &SeriesPayload, columns: &[Column]) -> Result<Self, PipelineError> {
        let rows = payload
            .data
            .iter()
            .enumerate()
            .map(|(i, value)| row_from_value(i, value, columns))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rows).map_err(|date| {
            PipelineError::MalformedResponse(format!("date {} appears more than once", date))
        })
    }

    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn row_from_value(index: usize, value: &Value, columns: &[Column]) -> Result<SnapshotRow, PipelineError> {
    let malformed = |msg: String| PipelineError::MalformedResponse(format!("row {}: {}", index, msg));

    let cells: Vec<&Value> = match value {
        Value::Array(items) => {
            if items.len() != columns.len() {
                return Err(malformed(format!(
                    "expected {} values, found {}",
                    columns.len(),
                    items.len()
                )));
            }
            items.iter().collect()
        }
        Value::Object(map) => columns
            .iter()
            .map(|c| {
                map.get(c.name())
                    .ok_or_else(|| malformed(format!("missing field {}", c)))
            })
            .collect::<Result<_, _>>()?,
        other => return Err(malformed(format!("expected array or object, found {}", other))),
    };

    let mut fecha = None;
    let mut values = [None; 7];
    for (column, cell) in columns.iter().zip(cells) {
        match column.indicator_index() {
            None => {
                let raw = cell
                    .as_str()
                    .ok_or_else(|| malformed(format!("Fecha is not a string: {}", cell)))?;
                // The API may append a time component.
                let date_part = raw.split('T').next().unwrap_or(raw);
                fecha = Some(
                    NaiveDate::parse_from_str(date_part, DATE_FORMAT)
                        .map_err(|e| malformed(format!("invalid Fecha '{}': {}", raw, e)))?,
                );
            }
            Some(i) => {
                values[i] = match cell {
                    Value::Null => None,
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) if s.trim().is_empty() => None,
                    Value::String(s) => Some(
                        s.trim()
                            .parse::<f64>()
                            .ok()
                            .filter(|v| v.is_finite())
                            .ok_or_else(|| malformed(format!("{} is not a number: '{}'", column, s)))?,
                    ),
                    other => return Err(malformed(format!("{} is not a number: {}", column, other))),
                };
            }
        }
    }

    let fecha = fecha.ok_or_else(|| malformed("no Fecha column".to_string()))?;
    Ok(SnapshotRow { fecha, values })
}

/// `{data_dir}/{source}/{YYYY-MM-DD}/{hour}_hour.csv` for the run's logical date.
pub fn snapshot_path(data_dir: &Path, source: &str, logical_date: NaiveDateTime) -> PathBuf {
    data_dir
        .join(source)
        .join(logical_date.format(DATE_FORMAT).to_string())
        .join(format!("{}_hour.csv", logical_date.hour()))
}

/// Writes `snapshot` to `path`, replacing any previous file.
///
/// Parent directories are created when missing. The rows go to a sibling
/// temp file first, which is then renamed over `path`.
pub fn write_snapshot(snapshot: &Snapshot, path: &Path) -> Result<(), PipelineError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| PipelineError::snapshot(dir, e))?;
    }

    let tmp = path.with_extension("csv.tmp");
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&tmp)
        .map_err(|e| PipelineError::snapshot(&tmp, e))?;
    for row in snapshot.rows() {
        wtr.write_record(row.to_record())
            .map_err(|e| PipelineError::snapshot(&tmp, e))?;
    }
    wtr.flush().map_err(|e| PipelineError::snapshot(&tmp, e))?;
    drop(wtr);

    fs::rename(&tmp, path).map_err(|e| PipelineError::snapshot(path, e))?;
    tracing::debug!("Wrote {} rows to {}", snapshot.len(), path.display());
    Ok(())
}

/// Reads and validates a snapshot file.
///
/// Every record must have exactly eight fields: a `YYYY-MM-DD` date followed
/// by seven finite numbers or empty fields. Any deviation is a
/// [`PipelineError::Validation`] naming the line and column.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, PipelineError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| PipelineError::snapshot(path, e))?;

    let mut rows = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| PipelineError::Validation(format!("{}: {}", path.display(), e)))?;
        let line = record.position().map(|p| p.line()).unwrap_or(i as u64 + 1);
        let invalid = |msg: String| {
            PipelineError::Validation(format!("{} line {}: {}", path.display(), line, msg))
        };

        if record.len() != Column::ALL.len() {
            return Err(invalid(format!(
                "expected {} columns, found {}",
                Column::ALL.len(),
                record.len()
            )));
        }

        let raw_date = &record[0];
        let fecha = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|_| invalid(format!("column Fecha: '{}' is not a date", raw_date)))?;

        let mut values = [None; 7];
        for column in Column::INDICATORS {
            let raw = &record[column.position()];
            if raw.is_empty() {
                continue;
            }
            let value = raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid(format!("column {}: '{}' is not a number", column, raw)))?;
            if let Some(i) = column.indicator_index() {
                values[i] = Some(value);
            }
        }
        rows.push(SnapshotRow { fecha, values });
    }

    Snapshot::new(rows).map_err(|date| {
        PipelineError::Validation(format!(
            "{}: date {} appears more than once",
            path.display(),
            date
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payload(data: Value) -> SeriesPayload {
        serde_json::from_value(json!({ "data": data })).unwrap()
    }

    const DOLAR: [Column; 2] = [Column::Fecha, Column::CotizacionDolar];

    #[test]
    fn payload_arrays_are_sorted() {
        let p = payload(json!([["2023-02-01", 800.0], ["2023-01-01T00:00:00", 1200.0]]));
        let snap = Snapshot::from_payload(&p, &DOLAR).unwrap();
        assert_eq!(snap.rows()[0].fecha, date(2023, 1, 1));
        assert_eq!(snap.rows()[0].get(Column::CotizacionDolar), Some(1200.0));
        assert_eq!(snap.rows()[1].get(Column::IpcGral), None);
    }

    #[test]
    fn payload_records_by_column_name() {
        let p = payload(json!([{ "Fecha": "2023-01-01", "Cotizacion_Dolar": "177.13" }]));
        let snap = Snapshot::from_payload(&p, &DOLAR).unwrap();
        assert_eq!(snap.rows()[0].get(Column::CotizacionDolar), Some(177.13));
    }

    #[test]
    fn payload_nulls_become_missing_values() {
        let p = payload(json!([["2023-01-01", null]]));
        let snap = Snapshot::from_payload(&p, &DOLAR).unwrap();
        assert_eq!(snap.rows()[0].values, [None; 7]);
    }

    #[test]
    fn payload_shape_errors_are_malformed() {
        for bad in [
            json!([["2023-01-01"]]),
            json!([["01/02/2023", 1.0]]),
            json!([["2023-01-01", "abc"]]),
            json!([["2023-01-01", "NaN"]]),
            json!([["2023-01-01", "inf"]]),
            json!([["2023-01-01", "-infinity"]]),
            json!([42]),
            json!([{ "Fecha": "2023-01-01" }]),
            json!([["2023-01-01", 1.0], ["2023-01-01", 2.0]]),
        ] {
            let err = Snapshot::from_payload(&payload(bad.clone()), &DOLAR).unwrap_err();
            assert!(
                matches!(err, PipelineError::MalformedResponse(_)),
                "{bad} gave {err:?}"
            );
        }
    }

    #[test]
    fn snapshot_path_uses_date_and_hour() {
        let logical = date(2023, 6, 1).and_hms_opt(14, 30, 0).unwrap();
        let path = snapshot_path(Path::new("/srv/data"), "ipc", logical);
        assert_eq!(path, PathBuf::from("/srv/data/ipc/2023-06-01/14_hour.csv"));
    }

    #[test]
    fn write_creates_directories_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dolar/2023-03-01/0_hour.csv");
        let snap = Snapshot::new(vec![
            SnapshotRow::new(date(2023, 1, 1)).with(Column::CotizacionDolar, 1200.5),
            SnapshotRow::new(date(2023, 2, 1))
                .with(Column::IpcGral, 1282.7)
                .with(Column::IpcTransporte, 1249.5),
        ])
        .unwrap();

        write_snapshot(&snap, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "2023-01-01,1200.5,,,,,,\n2023-02-01,,1282.7,,,,,1249.5\n"
        );
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn write_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.csv");
        let two = Snapshot::new(vec![
            SnapshotRow::new(date(2023, 1, 1)).with(Column::CotizacionDolar, 1.0),
            SnapshotRow::new(date(2023, 2, 1)).with(Column::CotizacionDolar, 2.0),
        ])
        .unwrap();
        let one = Snapshot::new(vec![
            SnapshotRow::new(date(2023, 3, 1)).with(Column::CotizacionDolar, 3.0),
        ])
        .unwrap();

        write_snapshot(&two, &path).unwrap();
        write_snapshot(&one, &path).unwrap();

        assert_eq!(read_snapshot(&path).unwrap(), one);
    }

    #[test]
    fn read_rejects_non_numeric_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "2023-01-01,1200,n/a,,,,,\n").unwrap();
        let err = read_snapshot(&path).unwrap_err();
        match err {
            PipelineError::Validation(msg) => {
                assert!(msg.contains("IPC_Gral"), "{msg}");
                assert!(msg.contains("line 1"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn read_rejects_missing_columns_and_bad_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.csv");
        fs::write(&path, "2023-01-01,1200\n").unwrap();
        assert!(matches!(read_snapshot(&path), Err(PipelineError::Validation(_))));

        fs::write(&path, "January,1200,,,,,,\n").unwrap();
        assert!(matches!(read_snapshot(&path), Err(PipelineError::Validation(_))));

        fs::write(&path, "2023-01-01,NaN,,,,,,\n").unwrap();
        assert!(matches!(read_snapshot(&path), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn read_missing_file_is_snapshot_error() {
        let err = read_snapshot(Path::new("/nonexistent/snap.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Snapshot { .. }));
    }
}
