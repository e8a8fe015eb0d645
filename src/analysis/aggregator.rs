//! Run record aggregation.
//!
//! Folds run records into one [`Bucket`] per (N, L, p) key and turns the
//! buckets into a sorted [`SummaryTable`].

use crate::models::{
    Bucket, BucketKey, Disagreement, RecordError, RowSchema, RunRecord, SummaryRow,
    SummaryTable,
};
use crate::scanner::{RecordScanner, ScanConfig};
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Accumulates records into buckets.
///
/// The map is ordered by [`BucketKey`], so iteration order is the output
/// order regardless of the order records arrive in.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    schema: RowSchema,
    buckets: BTreeMap<BucketKey, Bucket>,
}

impl Aggregator {
    pub fn new(schema: RowSchema) -> Self {
        Self {
            schema,
            buckets: BTreeMap::new(),
        }
    }

    /// Insert a new bucket for the record's key, or merge into the existing one.
    ///
    /// Records must carry sweep settings exactly when the aggregator is in
    /// boundary mode.
    pub fn add(&mut self, record: &RunRecord) -> Result<(), RecordError> {
        if record.schema() != self.schema {
            return Err(RecordError::SchemaMismatch(self.schema));
        }
        let key = record.key();
        match self.buckets.get_mut(&key) {
            Some(bucket) => bucket.merge(record),
            None => {
                self.buckets.insert(key, Bucket::seed(record));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets whose first-wins fields saw more than one value.
    pub fn disagreements(&self) -> Vec<(BucketKey, Disagreement)> {
        self.buckets
            .iter()
            .filter_map(|(key, bucket)| bucket.disagreement().map(|d| (*key, d)))
            .collect()
    }

    /// Emit one row per bucket, sorted by (N, L, p).
    pub fn to_table(&self) -> SummaryTable {
        SummaryTable {
            schema: self.schema,
            rows: self
                .buckets
                .iter()
                .map(|(key, bucket)| SummaryRow::from_bucket(*key, bucket))
                .collect(),
        }
    }
}

/// What happened while reading one results directory.
#[derive(Debug)]
pub struct Collected {
    pub aggregator: Aggregator,
    /// Files that parsed and contributed a record.
    pub files_read: usize,
    /// Files skipped as malformed.
    pub skipped: Vec<PathBuf>,
}

/// Read, parse and fold every record file in `directory`.
///
/// Malformed files are logged and skipped. A record that parses but lacks a
/// required field aborts the whole pass.
pub fn collect_directory(
    directory: &Path,
    scan_config: &ScanConfig,
    schema: RowSchema,
    progress: &ProgressBar,
) -> Result<Collected> {
    let scanner = RecordScanner::new(directory.to_path_buf(), scan_config.clone());
    let mut collected = Collected {
        aggregator: Aggregator::new(schema),
        files_read: 0,
        skipped: Vec::new(),
    };

    for path in scanner.files() {
        let path = path?;
        progress.inc(1);
        progress.set_message(display_name(&path));

        match read_record(&path, schema)? {
            Some(record) => {
                debug!("{} -> {}", path.display(), record.key());
                collected
                    .aggregator
                    .add(&record)
                    .with_context(|| format!("Invalid record in {}", path.display()))?;
                collected.files_read += 1;
            }
            None => {
                progress.suspend(|| {
                    warn!("Skipping malformed record file: {}", display_name(&path))
                });
                collected.skipped.push(path);
            }
        }
    }

    for (key, d) in collected.aggregator.disagreements() {
        warn!(
            "Bucket {} mixes run settings across {} records (timeout limits: {}, sweep schedules: {}, sweep limits: {}); kept first-seen values",
            key, d.records, d.timeout_limits, d.sweep_schedules, d.sweep_limits
        );
    }

    Ok(collected)
}

/// Parse one record file. `Ok(None)` means the file is malformed and should be skipped.
///
/// A file that cannot be read at all is an error, not a skip.
pub fn read_record(path: &Path, schema: RowSchema) -> Result<Option<RunRecord>> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read record file: {}", path.display()))?;

    let value: Value = match serde_json::from_slice(&content) {
        Ok(value) => value,
        Err(e) => {
            debug!("{}: {}", path.display(), e);
            return Ok(None);
        }
    };

    match RunRecord::from_value(&value, schema) {
        Ok(record) => Ok(Some(record)),
        Err(e) if e.is_malformed() => {
            debug!("{}: {}", path.display(), e);
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Invalid record in {}", path.display())),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorRate, RecordError};
    use serde_json::json;
    use tempfile::TempDir;

    fn record_json(
        cycles: i64,
        l: i64,
        p: f64,
        trials: i64,
        successes: i64,
        clear: i64,
        runtime: f64,
    ) -> Value {
        json!({
            "Cycles": cycles, "L": l, "p": p,
            "Trials": trials, "Successes": successes, "Clear syndromes": clear,
            "Timeout": 100, "Job RunTime (s)": runtime
        })
    }

    fn record(
        cycles: i64,
        l: i64,
        p: f64,
        trials: i64,
        successes: i64,
        clear: i64,
        runtime: f64,
    ) -> RunRecord {
        RunRecord::from_value(
            &record_json(cycles, l, p, trials, successes, clear, runtime),
            RowSchema::Standard,
        )
        .unwrap()
    }

    fn sample_records() -> Vec<RunRecord> {
        vec![
            record(1, 3, 0.1, 100, 90, 95, 10.0),
            record(2, 3, 0.1, 10, 9, 10, 1.0),
            record(1, 5, 0.05, 40, 39, 40, 3.0),
            record(1, 3, 0.1, 50, 40, 48, 5.0),
            record(1, 3, 0.02, 20, 20, 20, 0.5),
        ]
    }

    fn write_dir(records: &[Value]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for (i, value) in records.iter().enumerate() {
            std::fs::write(
                temp_dir.path().join(format!("run{}.json", i)),
                serde_json::to_vec(value).unwrap(),
            )
            .unwrap();
        }
        temp_dir
    }

    #[test]
    fn test_merges_same_key() {
        let mut agg = Aggregator::new(RowSchema::Standard);
        for rec in sample_records() {
            agg.add(&rec).unwrap();
        }
        let table = agg.to_table();
        assert_eq!(table.rows.len(), 4);

        let key = BucketKey {
            cycle_count: 1,
            lattice_size: 3,
            physical_error_rate: ErrorRate(0.1),
        };
        let row = table.rows.iter().find(|r| r.base().key == key).unwrap().base();
        assert_eq!(row.trials, 150);
        assert_eq!(row.fails, 20);
        assert_eq!(row.timeouts, 7);
        assert_eq!(row.max_runtime, 10.0);
        assert_eq!(row.total_runtime, 15.0);
    }

    #[test]
    fn test_order_independent() {
        let records = sample_records();
        let mut forward = Aggregator::new(RowSchema::Standard);
        for rec in &records {
            forward.add(rec).unwrap();
        }
        let mut backward = Aggregator::new(RowSchema::Standard);
        for rec in records.iter().rev() {
            backward.add(rec).unwrap();
        }
        let mut rotated = Aggregator::new(RowSchema::Standard);
        for rec in records.iter().cycle().skip(2).take(records.len()) {
            rotated.add(rec).unwrap();
        }

        assert_eq!(forward.to_table(), backward.to_table());
        assert_eq!(forward.to_table(), rotated.to_table());
    }

    #[test]
    fn test_rows_sorted() {
        let mut agg = Aggregator::new(RowSchema::Standard);
        for rec in sample_records() {
            agg.add(&rec).unwrap();
        }
        let keys: Vec<BucketKey> = agg.to_table().rows.iter().map(|r| r.base().key).collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(keys[0].physical_error_rate, ErrorRate(0.02));
        assert_eq!(keys[3].cycle_count, 2);
    }

    #[test]
    fn test_collect_skips_malformed() {
        let values: Vec<Value> = vec![
            record_json(1, 3, 0.1, 100, 90, 95, 10.0),
            record_json(1, 3, 0.1, 50, 40, 48, 5.0),
        ];
        let clean = write_dir(&values);
        let dirty = write_dir(&values);
        std::fs::write(dirty.path().join("broken.json"), "{\"L\": 3, ").unwrap();

        let hidden = ProgressBar::hidden();
        let from_clean =
            collect_directory(clean.path(), &ScanConfig::default(), RowSchema::Standard, &hidden)
                .unwrap();
        let from_dirty =
            collect_directory(dirty.path(), &ScanConfig::default(), RowSchema::Standard, &hidden)
                .unwrap();

        assert_eq!(from_clean.aggregator.to_table(), from_dirty.aggregator.to_table());
        assert_eq!(from_dirty.files_read, 2);
        assert_eq!(from_dirty.skipped.len(), 1);
        assert!(from_dirty.skipped[0].ends_with("broken.json"));
    }

    #[test]
    fn test_repeated_runs_write_identical_bytes() {
        let dir = write_dir(&[
            record_json(2, 5, 0.03, 30, 28, 29, 1.5),
            record_json(1, 3, 0.1, 100, 90, 95, 10.0),
            record_json(1, 3, 0.1, 50, 40, 48, 5.0),
        ]);
        let render = || {
            let collected = collect_directory(
                dir.path(),
                &ScanConfig::default(),
                RowSchema::Standard,
                &ProgressBar::hidden(),
            )
            .unwrap();
            let mut out = Vec::new();
            crate::report::write_summary(&collected.aggregator.to_table(), &mut out).unwrap();
            out
        };
        assert_eq!(render(), render());
    }

    #[test]
    fn test_missing_cycle_count_aborts() {
        let mut bad = record_json(1, 3, 0.1, 10, 9, 10, 1.0);
        bad.as_object_mut().unwrap().remove("Cycles");
        let dir = write_dir(&[record_json(1, 3, 0.1, 10, 9, 10, 1.0), bad]);

        let err = collect_directory(
            dir.path(),
            &ScanConfig::default(),
            RowSchema::Standard,
            &ProgressBar::hidden(),
        )
        .unwrap_err();
        let cause = err.downcast_ref::<RecordError>().unwrap();
        assert!(matches!(cause, RecordError::MissingCycleCount));
    }

    #[test]
    fn test_boundary_records() {
        let mut value = record_json(3, 5, 0.01, 10, 8, 9, 2.0);
        let obj = value.as_object_mut().unwrap();
        obj.insert("Sweep limit".to_string(), json!(7));
        obj.insert("Sweep schedule".to_string(), json!("rotating"));
        let dir = write_dir(&[value]);

        let collected = collect_directory(
            dir.path(),
            &ScanConfig::default(),
            RowSchema::Boundary,
            &ProgressBar::hidden(),
        )
        .unwrap();
        let table = collected.aggregator.to_table();
        assert_eq!(table.schema, RowSchema::Boundary);
        match &table.rows[0] {
            SummaryRow::Boundary {
                schedule, frequency, ..
            } => {
                assert_eq!(schedule, "rotating");
                assert_eq!(frequency.to_string(), "7");
            }
            other => panic!("expected boundary row, got {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_file_aborts() {
        let dir = write_dir(&[record_json(1, 3, 0.1, 10, 9, 10, 1.0)]);
        let unreadable = dir.path().join("run_dir.json");
        std::fs::create_dir(&unreadable).unwrap();

        assert!(read_record(&unreadable, RowSchema::Standard).is_err());

        // The scanner lists regular files only, so the pass itself still succeeds.
        let collected = collect_directory(
            dir.path(),
            &ScanConfig::default(),
            RowSchema::Standard,
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(collected.files_read, 1);
        assert!(collected.skipped.is_empty());
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let mut agg = Aggregator::new(RowSchema::Boundary);
        let err = agg.add(&record(1, 3, 0.1, 10, 9, 10, 1.0)).unwrap_err();
        assert!(matches!(err, RecordError::SchemaMismatch(RowSchema::Boundary)));
        assert!(agg.is_empty());
    }

    #[test]
    fn test_negative_zero_rate_merges() {
        let mut agg = Aggregator::new(RowSchema::Standard);
        agg.add(&record(1, 3, 0.0, 10, 9, 10, 1.0)).unwrap();
        agg.add(&record(1, 3, -0.0, 10, 8, 10, 1.0)).unwrap();

        let table = agg.to_table();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].base().trials, 20);
        assert_eq!(table.rows[0].base().fails, 3);
    }
}
