//! Anomaly scan over the accumulated dollar quotes.

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::Db;
use crate::error::PipelineError;

/// Dates whose dollar quote exceeded the threshold at scan time.
///
/// Recomputed on every scan and never stored.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AnomalyReport {
    pub table: String,
    pub threshold: f64,
    /// Ascending, no duplicates.
    pub dates: Vec<NaiveDate>,
}

impl AnomalyReport {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Human-readable summary, `None` when nothing was flagged.
    pub fn summary(&self) -> Option<String> {
        if self.dates.is_empty() {
            return None;
        }
        let dates = self
            .dates
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "{} date(s) with anomalous dollar quotes above {} in {}: {}",
            self.dates.len(),
            self.threshold,
            self.table,
            dates
        ))
    }
}

/// Flags every date in `table` whose `Cotizacion_Dolar` is strictly above
/// `threshold`. Read-only; logs the summary when something was found.
pub fn scan(db: &Db, table: &str, threshold: f64) -> Result<AnomalyReport, PipelineError> {
    if !threshold.is_finite() {
        return Err(PipelineError::Validation(format!(
            "threshold must be a finite number, got {}",
            threshold
        )));
    }
    let dates = db.dates_above(table, threshold)?;
    let report = AnomalyReport {
        table: table.to_string(),
        threshold,
        dates,
    };
    if let Some(summary) = report.summary() {
        tracing::info!("{}", summary);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Snapshot, SnapshotRow};
    use datosgob_api::types::Column;

    const TABLE: &str = "hist_dolar_ipc";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded_db() -> Db {
        let mut db = Db::open_in_memory().unwrap();
        let snap = Snapshot::new(vec![
            SnapshotRow::new(date(2023, 1, 1)).with(Column::CotizacionDolar, 1200.0),
            SnapshotRow::new(date(2023, 2, 1)).with(Column::CotizacionDolar, 800.0),
        ])
        .unwrap();
        db.load_snapshot(TABLE, &snap).unwrap();
        db
    }

    #[test]
    fn scan_flags_dates_above_threshold() {
        let db = seeded_db();
        let report = scan(&db, TABLE, 1000.0).unwrap();
        assert_eq!(report.dates, vec![date(2023, 1, 1)]);
        let summary = report.summary().unwrap();
        assert!(summary.contains("2023-01-01"));
        assert!(!summary.contains("2023-02-01"));
    }

    #[test]
    fn scan_without_anomalies_is_silent() {
        let db = seeded_db();
        let report = scan(&db, TABLE, 5000.0).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.summary(), None);
    }

    #[test]
    fn scan_does_not_mutate() {
        let db = seeded_db();
        scan(&db, TABLE, 0.0).unwrap();
        scan(&db, TABLE, 0.0).unwrap();
        assert_eq!(db.row_count(TABLE).unwrap(), 2);
    }

    #[test]
    fn scan_rejects_nan_threshold() {
        let db = seeded_db();
        assert!(matches!(
            scan(&db, TABLE, f64::NAN),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn report_serializes_dates_as_iso() {
        let report = AnomalyReport {
            table: TABLE.to_string(),
            threshold: 1000.0,
            dates: vec![date(2023, 1, 1)],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dates"][0], "2023-01-01");
    }
}
