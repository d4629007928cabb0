//! SQLite storage for the dollar/CPI history table.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDate;
use datosgob_api::types::Column;
use regex::Regex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use crate::error::{is_busy, PipelineError};
use crate::snapshot::{Snapshot, SnapshotRow};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Rows written by one load, split by what happened to each snapshot row.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// New dates added to the table.
    pub inserted: usize,
    /// Dates already present whose NULL indicators were filled in.
    pub backfilled: usize,
    /// Dates already present with nothing to add.
    pub unchanged: usize,
}

impl LoadOutcome {
    pub fn total(&self) -> usize {
        self.inserted + self.backfilled + self.unchanged
    }
}

/// Checks that `name` is a plain SQL identifier.
///
/// Table names cannot be bound as statement parameters, so they are
/// validated here and then always quoted.
pub fn validate_table_name(name: &str) -> Result<&str, PipelineError> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let re = IDENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier regex is valid")
    });
    if re.is_match(name) {
        Ok(name)
    } else {
        Err(PipelineError::Schema(format!(
            "'{}' is not a valid table name",
            name
        )))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Affinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

/// SQLite's column affinity rules for a declared type.
fn affinity(declared: &str) -> Affinity {
    let t = declared.to_ascii_uppercase();
    if t.contains("INT") {
        Affinity::Integer
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        Affinity::Text
    } else if t.is_empty() || t.contains("BLOB") {
        Affinity::Blob
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        Affinity::Real
    } else {
        Affinity::Numeric
    }
}

fn column_list() -> String {
    Column::ALL
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens the database file, waiting up to `busy_timeout` for other writers.
    pub fn open_with_timeout(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Opens a database file only if it already exists. Nothing is created
    /// on disk and the journal mode is left as is; `None` when absent.
    pub fn open_existing(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> Result<Option<Self>, PipelineError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Some(Self { conn }))
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for tests).
    #[doc(hidden)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, PipelineError> {
        let table = validate_table_name(table)?;
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Creates the history table when absent, then checks that whatever
    /// table now carries that name has the canonical layout.
    pub fn ensure_table(&self, table: &str) -> Result<(), PipelineError> {
        let table = validate_table_name(table)?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                Fecha DATE PRIMARY KEY,
                Cotizacion_Dolar FLOAT,
                IPC_Gral FLOAT,
                Var_Porc_IPC_Gral FLOAT,
                IPC_Salud FLOAT,
                IPC_Educacion FLOAT,
                IPC_Alimentos_Bebidas FLOAT,
                IPC_Transporte FLOAT
            )",
            table
        );
        match self.conn.execute(&ddl, []) {
            Ok(_) => {}
            Err(e) if is_busy(&e) => return Err(e.into()),
            Err(e) => {
                return Err(PipelineError::Schema(format!(
                    "failed to create table {}: {}",
                    table, e
                )))
            }
        }
        self.check_layout(table)
    }

    fn check_layout(&self, table: &str) -> Result<(), PipelineError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
        // (name, declared type, pk position)
        let live: Vec<(String, String, i64)> = stmt
            .query_map([], |row| Ok((row.get(1)?, row.get(2)?, row.get(5)?)))?
            .collect::<Result<_, _>>()?;

        for column in Column::ALL {
            let Some((_, declared, pk)) = live
                .iter()
                .find(|(name, _, _)| name.eq_ignore_ascii_case(column.name()))
            else {
                return Err(PipelineError::Schema(format!(
                    "table {} exists without column {}",
                    table, column
                )));
            };
            let found = affinity(declared);
            let compatible = match column {
                Column::Fecha => matches!(found, Affinity::Numeric | Affinity::Text),
                _ => found == Affinity::Real,
            };
            if !compatible {
                return Err(PipelineError::Schema(format!(
                    "table {} column {} has incompatible type '{}'",
                    table, column, declared
                )));
            }
            let is_key = *pk > 0;
            if is_key != (column == Column::Fecha) {
                return Err(PipelineError::Schema(format!(
                    "table {} must be keyed by Fecha alone",
                    table
                )));
            }
        }
        if let Some((name, _, _)) = live.iter().find(|(name, _, pk)| {
            *pk > 0 && !name.eq_ignore_ascii_case(Column::Fecha.name())
        }) {
            return Err(PipelineError::Schema(format!(
                "table {} has extra key column {}",
                table, name
            )));
        }
        Ok(())
    }

    /// Appends the snapshot rows to `table` in one transaction.
    ///
    /// A date already in the table is never duplicated or overwritten: the
    /// insert is skipped and only indicators stored as NULL are filled from
    /// the snapshot. Loading the same snapshot twice inserts nothing the
    /// second time.
    pub fn load_snapshot(
        &mut self,
        table: &str,
        snapshot: &Snapshot,
    ) -> Result<LoadOutcome, PipelineError> {
        let table = validate_table_name(table)?;
        self.ensure_table(table)?;

        let insert_sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(Fecha) DO NOTHING",
            table,
            column_list()
        );
        let set_clause = Column::INDICATORS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{0} = COALESCE({0}, ?{1})", c.name(), i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let gap_clause = Column::INDICATORS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("({} IS NULL AND ?{} IS NOT NULL)", c.name(), i + 2))
            .collect::<Vec<_>>()
            .join(" OR ");
        let backfill_sql = format!(
            "UPDATE \"{}\" SET {} WHERE Fecha = ?1 AND ({})",
            table, set_clause, gap_clause
        );

        let mut outcome = LoadOutcome::default();
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(&insert_sql)?;
            let mut backfill = tx.prepare(&backfill_sql)?;
            for row in snapshot.rows() {
                let fecha = row.fecha.format("%Y-%m-%d").to_string();
                let v = &row.values;
                let args = params![fecha, v[0], v[1], v[2], v[3], v[4], v[5], v[6]];
                if insert.execute(args)? == 1 {
                    outcome.inserted += 1;
                } else if backfill.execute(args)? > 0 {
                    outcome.backfilled += 1;
                } else {
                    outcome.unchanged += 1;
                }
            }
        }
        tx.commit()?;

        tracing::info!(
            "Loaded {} rows into {}: {} inserted, {} backfilled, {} unchanged",
            outcome.total(),
            table,
            outcome.inserted,
            outcome.backfilled,
            outcome.unchanged
        );
        Ok(outcome)
    }

    /// Distinct dates whose dollar quote is strictly above `threshold`, ascending.
    ///
    /// A table that does not exist yet holds no anomalies.
    pub fn dates_above(&self, table: &str, threshold: f64) -> Result<Vec<NaiveDate>, PipelineError> {
        let table = validate_table_name(table)?;
        if !self.table_exists(table)? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT Fecha FROM \"{}\" WHERE Cotizacion_Dolar > ?1 ORDER BY Fecha ASC",
            table
        ))?;
        let raw: Vec<String> = stmt
            .query_map(params![threshold], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        raw.iter()
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                    PipelineError::Schema(format!("table {} holds non-date Fecha '{}'", table, s))
                })
            })
            .collect()
    }

    pub fn row_count(&self, table: &str) -> Result<i64, PipelineError> {
        let table = validate_table_name(table)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(1) FROM \"{}\"", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get_row(&self, table: &str, fecha: NaiveDate) -> Result<Option<SnapshotRow>, PipelineError> {
        let table = validate_table_name(table)?;
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM \"{}\" WHERE Fecha = ?1", column_list(), table),
                params![fecha.format("%Y-%m-%d").to_string()],
                |row| {
                    let mut values = [None; 7];
                    for (i, slot) in values.iter_mut().enumerate() {
                        *slot = row.get::<_, Option<f64>>(i + 1)?;
                    }
                    Ok(SnapshotRow { fecha, values })
                },
            )
            .optional()?;
        Ok(row)
    }
}
