use dolar_ipc_lib::{AnomalyReport, LoadOutcome, RunSummary};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled, Serialize)]
pub struct SourceRow {
    #[tabled(rename = "Source")]
    #[serde(rename = "Source")]
    source: String,
    #[tabled(rename = "Stage")]
    #[serde(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Fetched")]
    #[serde(rename = "Fetched")]
    fetched: String,
    #[tabled(rename = "Inserted")]
    #[serde(rename = "Inserted")]
    inserted: String,
    #[tabled(rename = "Backfilled")]
    #[serde(rename = "Backfilled")]
    backfilled: String,
    #[tabled(rename = "Anomalies")]
    #[serde(rename = "Anomalies")]
    anomalies: String,
    #[tabled(rename = "Error")]
    #[serde(rename = "Error")]
    error: String,
}

#[derive(Tabled, Serialize)]
struct AnomalyRow {
    #[tabled(rename = "Date")]
    date: String,
}

#[derive(Tabled, Serialize)]
struct LoadRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Inserted")]
    inserted: usize,
    #[tabled(rename = "Backfilled")]
    backfilled: usize,
    #[tabled(rename = "Unchanged")]
    unchanged: usize,
}

fn count(value: Option<usize>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

// -- Row builders --

pub fn run_summary_rows(summary: &RunSummary) -> Vec<SourceRow> {
    summary
        .outcomes
        .iter()
        .map(|o| SourceRow {
            source: o.source.clone(),
            stage: o.stage().to_string(),
            fetched: count(o.fetched),
            inserted: count(o.load.map(|l| l.inserted)),
            backfilled: count(o.load.map(|l| l.backfilled)),
            anomalies: count(o.report.as_ref().map(|r| r.dates.len())),
            error: o
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        })
        .collect()
}

fn build_anomaly_rows(report: &AnomalyReport) -> Vec<AnomalyRow> {
    report
        .dates
        .iter()
        .map(|d| AnomalyRow {
            date: d.to_string(),
        })
        .collect()
}

// -- Table output --

pub fn print_run_summary_table(rows: &[SourceRow]) {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

pub fn print_anomaly_table(report: &AnomalyReport) {
    match report.summary() {
        None => eprintln!(
            "No dollar quotes above {} in {}",
            report.threshold, report.table
        ),
        Some(summary) => {
            eprintln!("{}", summary);
            let mut table = Table::new(build_anomaly_rows(report));
            table.with(Style::rounded());
            println!("{}", table);
        }
    }
}

pub fn print_load_table(table_name: &str, outcome: &LoadOutcome) {
    let row = LoadRow {
        table: table_name.to_string(),
        inserted: outcome.inserted,
        backfilled: outcome.backfilled,
        unchanged: outcome.unchanged,
    };
    let mut table = Table::new([row]);
    table.with(Style::rounded());
    println!("{}", table);
}

// -- JSON output --

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}
