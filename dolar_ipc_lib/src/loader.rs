//! Loads a persisted snapshot file into the history table.

use std::path::Path;

use crate::db::{Db, LoadOutcome};
use crate::error::PipelineError;
use crate::snapshot::read_snapshot;

/// Reads `snapshot_path`, validates every row, then appends it to `table`.
///
/// Validation runs over the whole file before the first write, so a bad
/// value anywhere leaves the table untouched. Returns how many rows were
/// actually inserted; dates already present are never duplicated.
pub fn load(db: &mut Db, snapshot_path: &Path, table: &str) -> Result<LoadOutcome, PipelineError> {
    let snapshot = read_snapshot(snapshot_path)?;
    tracing::debug!(
        "Read {} rows from {}",
        snapshot.len(),
        snapshot_path.display()
    );
    db.load_snapshot(table, &snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TABLE: &str = "hist_dolar_ipc";

    #[test]
    fn load_file_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.csv");
        fs::write(
            &path,
            "2023-01-01,1200,1203.0,0.06,1150.4,1190.2,1230.7,1180.9\n\
             2023-02-01,800,,,,,,\n",
        )
        .unwrap();

        let mut db = Db::open_in_memory().unwrap();
        let first = load(&mut db, &path, TABLE).unwrap();
        assert_eq!(first.inserted, 2);
        let second = load(&mut db, &path, TABLE).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(db.row_count(TABLE).unwrap(), 2);
    }

    #[test]
    fn invalid_file_leaves_table_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.csv");
        let bad = dir.path().join("bad.csv");
        fs::write(&good, "2023-01-01,1200,,,,,,\n").unwrap();
        // Valid first row, broken second row: nothing from this file may land.
        fs::write(&bad, "2023-03-01,900,,,,,,\n2023-04-01,950,abc,,,,,\n").unwrap();

        let mut db = Db::open_in_memory().unwrap();
        load(&mut db, &good, TABLE).unwrap();

        let err = load(&mut db, &bad, TABLE).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(db.row_count(TABLE).unwrap(), 1);
    }

    #[test]
    fn empty_file_inserts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();
        let mut db = Db::open_in_memory().unwrap();
        let outcome = load(&mut db, &path, TABLE).unwrap();
        assert_eq!(outcome, LoadOutcome::default());
        assert!(db.table_exists(TABLE).unwrap());
    }
}
