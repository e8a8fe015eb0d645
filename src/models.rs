//! Data models for run records, aggregate buckets and summary rows.
//!
//! A [`RunRecord`] is one parsed simulation result file. Records sharing a
//! [`BucketKey`] are folded into a [`Bucket`], and each bucket becomes one
//! [`SummaryRow`] of the output table.

use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Errors raised while extracting a [`RunRecord`] from parsed JSON.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The document parsed, but it is not a JSON object.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// Neither `Cycles` nor `Rounds` is present.
    #[error("record has neither a \"Cycles\" nor a \"Rounds\" field")]
    MissingCycleCount,

    /// A required field is absent.
    #[error("record is missing required field \"{0}\"")]
    MissingField(&'static str),

    /// Sweep settings are present without boundary mode, or missing with it.
    #[error("record sweep settings do not match the {0:?} schema")]
    SchemaMismatch(RowSchema),

    /// A required field holds a value of the wrong type.
    #[error("field \"{field}\" must be {expected}, found {found}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        found: String,
    },
}

impl RecordError {
    /// Whether the error means the file is not a record at all (skippable),
    /// as opposed to a record with unusable fields (fatal).
    pub fn is_malformed(&self) -> bool {
        matches!(self, RecordError::NotAnObject)
    }
}

/// Output table layout, selected by boundary mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowSchema {
    /// Base columns only.
    #[default]
    Standard,
    /// Base columns plus the sweep `schedule` and `frequency`.
    Boundary,
}

const STANDARD_HEADERS: &[&str] = &[
    "N",
    "L",
    "p",
    "pfail",
    "err",
    "trials",
    "fails",
    "timeouts",
    "timeout%",
    "limit",
    "max_runtime",
    "total_runtime",
];

const BOUNDARY_HEADERS: &[&str] = &[
    "N",
    "L",
    "p",
    "pfail",
    "err",
    "trials",
    "fails",
    "timeouts",
    "timeout%",
    "limit",
    "schedule",
    "frequency",
    "max_runtime",
    "total_runtime",
];

impl RowSchema {
    /// Pick the schema for the given boundary-mode flag.
    pub fn from_boundaries(boundaries: bool) -> Self {
        if boundaries {
            RowSchema::Boundary
        } else {
            RowSchema::Standard
        }
    }

    /// Column names in output order.
    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            RowSchema::Standard => STANDARD_HEADERS,
            RowSchema::Boundary => BOUNDARY_HEADERS,
        }
    }
}

/// Physical error rate with a total order, so it can be part of a map key.
#[derive(Debug, Clone, Copy)]
pub struct ErrorRate(pub f64);

impl ErrorRate {
    /// Wrap a rate, folding `-0.0` into `0.0` so both share a bucket.
    pub fn new(rate: f64) -> Self {
        if rate == 0.0 {
            ErrorRate(0.0)
        } else {
            ErrorRate(rate)
        }
    }
}

impl PartialEq for ErrorRate {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for ErrorRate {}

impl PartialOrd for ErrorRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ErrorRate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for ErrorRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_float(self.0))
    }
}

/// Composite grouping key. Field order defines the output sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BucketKey {
    /// Number of QEC cycles (N).
    pub cycle_count: i64,
    /// Lattice size (L).
    pub lattice_size: i64,
    /// Physical error rate (p).
    pub physical_error_rate: ErrorRate,
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "N={} L={} p={}",
            self.cycle_count, self.lattice_size, self.physical_error_rate
        )
    }
}

/// Boundary sweep settings carried by boundary-mode records.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    /// `Sweep limit`, written to the `frequency` column.
    pub limit: Number,
    /// `Sweep schedule`, written to the `schedule` column.
    pub schedule: String,
}

/// One simulation result file.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub cycle_count: i64,
    pub lattice_size: i64,
    pub physical_error_rate: f64,
    pub trials: i64,
    pub successes: i64,
    pub clear_syndromes: i64,
    /// Kept as the raw JSON number so the output reproduces the input.
    pub timeout_limit: Number,
    pub job_runtime_seconds: f64,
    pub sweep: Option<SweepSettings>,
}

impl RunRecord {
    /// Extract a record from a parsed JSON document.
    ///
    /// `Cycles` takes precedence over its alias `Rounds`. Sweep fields are
    /// required only for [`RowSchema::Boundary`].
    pub fn from_value(value: &Value, schema: RowSchema) -> Result<Self, RecordError> {
        let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

        let cycles = obj
            .get("Cycles")
            .or_else(|| obj.get("Rounds"))
            .ok_or(RecordError::MissingCycleCount)?;
        let cycle_count = as_integer(cycles, "Cycles")?;

        let sweep = match schema {
            RowSchema::Standard => None,
            RowSchema::Boundary => Some(SweepSettings {
                limit: number(obj, "Sweep limit")?,
                schedule: identifier(obj, "Sweep schedule")?,
            }),
        };

        Ok(Self {
            cycle_count,
            lattice_size: integer(obj, "L")?,
            physical_error_rate: float(obj, "p")?,
            trials: integer(obj, "Trials")?,
            successes: integer(obj, "Successes")?,
            clear_syndromes: integer(obj, "Clear syndromes")?,
            timeout_limit: number(obj, "Timeout")?,
            job_runtime_seconds: float(obj, "Job RunTime (s)")?,
            sweep,
        })
    }

    /// The bucket this record contributes to.
    pub fn key(&self) -> BucketKey {
        BucketKey {
            cycle_count: self.cycle_count,
            lattice_size: self.lattice_size,
            physical_error_rate: ErrorRate::new(self.physical_error_rate),
        }
    }

    /// Which row schema this record fits.
    pub fn schema(&self) -> RowSchema {
        RowSchema::from_boundaries(self.sweep.is_some())
    }

    /// Trials that failed.
    pub fn fails(&self) -> i64 {
        self.trials - self.successes
    }

    /// Trials that ended with a residual syndrome.
    pub fn timeouts(&self) -> i64 {
        self.trials - self.clear_syndromes
    }
}

fn field<'a>(obj: &'a Map<String, Value>, key: &'static str) -> Result<&'a Value, RecordError> {
    obj.get(key).ok_or(RecordError::MissingField(key))
}

fn invalid(field: &'static str, expected: &'static str, value: &Value) -> RecordError {
    RecordError::InvalidField {
        field,
        expected,
        found: value.to_string(),
    }
}

/// Integers may arrive as integral floats (`3.0`).
fn as_integer(value: &Value, key: &'static str) -> Result<i64, RecordError> {
    value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        })
        .ok_or_else(|| invalid(key, "an integer", value))
}

fn integer(obj: &Map<String, Value>, key: &'static str) -> Result<i64, RecordError> {
    as_integer(field(obj, key)?, key)
}

fn float(obj: &Map<String, Value>, key: &'static str) -> Result<f64, RecordError> {
    let value = field(obj, key)?;
    value.as_f64().ok_or_else(|| invalid(key, "a number", value))
}

fn number(obj: &Map<String, Value>, key: &'static str) -> Result<Number, RecordError> {
    match field(obj, key)? {
        Value::Number(n) => Ok(n.clone()),
        other => Err(invalid(key, "a number", other)),
    }
}

fn identifier(obj: &Map<String, Value>, key: &'static str) -> Result<String, RecordError> {
    match field(obj, key)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(invalid(key, "a string or scalar", other)),
    }
}

/// Cumulative counters for one [`BucketKey`].
#[derive(Debug, Clone)]
pub struct Bucket {
    pub trials: i64,
    pub fails: i64,
    pub timeouts: i64,
    pub runtime_total: f64,
    pub runtime_max: f64,
    /// First-seen value; later disagreements are counted, not applied.
    pub timeout_limit: Number,
    /// First-seen value, boundary mode only.
    pub sweep: Option<SweepSettings>,
    /// Number of records folded into this bucket.
    pub records: usize,
    seen_limits: BTreeSet<String>,
    seen_schedules: BTreeSet<String>,
    seen_sweep_limits: BTreeSet<String>,
}

/// Values that disagreed across records of one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disagreement {
    pub records: usize,
    pub timeout_limits: usize,
    pub sweep_schedules: usize,
    pub sweep_limits: usize,
}

impl Bucket {
    /// Create a bucket seeded from its first record.
    pub fn seed(record: &RunRecord) -> Self {
        let mut bucket = Self {
            trials: record.trials,
            fails: record.fails(),
            timeouts: record.timeouts(),
            runtime_total: record.job_runtime_seconds,
            runtime_max: record.job_runtime_seconds,
            timeout_limit: record.timeout_limit.clone(),
            sweep: record.sweep.clone(),
            records: 1,
            seen_limits: BTreeSet::new(),
            seen_schedules: BTreeSet::new(),
            seen_sweep_limits: BTreeSet::new(),
        };
        bucket.observe(record);
        bucket
    }

    /// Fold another record with the same key into this bucket.
    pub fn merge(&mut self, record: &RunRecord) {
        self.trials += record.trials;
        self.fails += record.fails();
        self.timeouts += record.timeouts();
        self.runtime_total += record.job_runtime_seconds;
        if record.job_runtime_seconds > self.runtime_max {
            self.runtime_max = record.job_runtime_seconds;
        }
        self.records += 1;
        self.observe(record);
    }

    fn observe(&mut self, record: &RunRecord) {
        self.seen_limits.insert(record.timeout_limit.to_string());
        if let Some(ref sweep) = record.sweep {
            self.seen_schedules.insert(sweep.schedule.clone());
            self.seen_sweep_limits.insert(sweep.limit.to_string());
        }
    }

    /// Distinct-value counts for the first-wins fields, if any field saw
    /// more than one value.
    pub fn disagreement(&self) -> Option<Disagreement> {
        let d = Disagreement {
            records: self.records,
            timeout_limits: self.seen_limits.len(),
            sweep_schedules: self.seen_schedules.len(),
            sweep_limits: self.seen_sweep_limits.len(),
        };
        if d.timeout_limits > 1 || d.sweep_schedules > 1 || d.sweep_limits > 1 {
            Some(d)
        } else {
            None
        }
    }

    /// Derived statistics for the accumulated counters.
    pub fn stats(&self) -> BucketStats {
        let (failure_rate, standard_error) = if self.trials > 0 {
            let trials = self.trials as f64;
            let rate = self.fails as f64 / trials;
            (rate, (rate * (1.0 - rate) / trials).sqrt())
        } else {
            (0.0, 0.0)
        };
        let timeout_fraction = if self.fails == 0 {
            0.0
        } else {
            self.timeouts as f64 / self.fails as f64
        };
        BucketStats {
            failure_rate,
            standard_error,
            timeout_fraction,
        }
    }
}

/// Statistics derived from a [`Bucket`] at emission time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStats {
    /// fails / trials.
    pub failure_rate: f64,
    /// Binomial proportion standard error.
    pub standard_error: f64,
    /// timeouts / fails, 0 when nothing failed.
    pub timeout_fraction: f64,
}

/// Columns shared by both row schemas.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseRow {
    pub key: BucketKey,
    pub stats: BucketStats,
    pub trials: i64,
    pub fails: i64,
    pub timeouts: i64,
    pub limit: Number,
    pub max_runtime: f64,
    pub total_runtime: f64,
}

/// One output row, tagged by schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryRow {
    Standard(BaseRow),
    Boundary {
        base: BaseRow,
        schedule: String,
        frequency: Number,
    },
}

impl SummaryRow {
    /// Build the row for a bucket. Buckets carrying sweep settings become
    /// boundary rows.
    pub fn from_bucket(key: BucketKey, bucket: &Bucket) -> Self {
        let base = BaseRow {
            key,
            stats: bucket.stats(),
            trials: bucket.trials,
            fails: bucket.fails,
            timeouts: bucket.timeouts,
            limit: bucket.timeout_limit.clone(),
            max_runtime: bucket.runtime_max,
            total_runtime: bucket.runtime_total,
        };
        match bucket.sweep {
            Some(ref sweep) => SummaryRow::Boundary {
                base,
                schedule: sweep.schedule.clone(),
                frequency: sweep.limit.clone(),
            },
            None => SummaryRow::Standard(base),
        }
    }

    pub fn base(&self) -> &BaseRow {
        match self {
            SummaryRow::Standard(base) => base,
            SummaryRow::Boundary { base, .. } => base,
        }
    }

    /// Cell values in the order of [`RowSchema::headers`].
    pub fn fields(&self) -> Vec<String> {
        let base = self.base();
        let mut fields = vec![
            base.key.cycle_count.to_string(),
            base.key.lattice_size.to_string(),
            base.key.physical_error_rate.to_string(),
            format_float(base.stats.failure_rate),
            format_float(base.stats.standard_error),
            base.trials.to_string(),
            base.fails.to_string(),
            base.timeouts.to_string(),
            format_float(base.stats.timeout_fraction),
            base.limit.to_string(),
        ];
        if let SummaryRow::Boundary {
            schedule,
            frequency,
            ..
        } = self
        {
            fields.push(schedule.clone());
            fields.push(frequency.to_string());
        }
        fields.push(format_float(base.max_runtime));
        fields.push(format_float(base.total_runtime));
        fields
    }
}

/// The complete aggregation output.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    pub schema: RowSchema,
    /// Rows sorted by (N, L, p).
    pub rows: Vec<SummaryRow>,
}

/// The columns the plotter needs from a summary row.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SummaryPoint {
    #[serde(rename = "N")]
    pub cycle_count: i64,
    #[serde(rename = "L")]
    pub lattice_size: i64,
    pub p: f64,
    pub pfail: f64,
    pub err: f64,
}

/// Render a float so integral values keep a trailing `.0`.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(trials: i64, successes: i64, clear: i64, runtime: f64) -> RunRecord {
        RunRecord::from_value(
            &json!({
                "Cycles": 1, "L": 3, "p": 0.1,
                "Trials": trials, "Successes": successes, "Clear syndromes": clear,
                "Timeout": 100, "Job RunTime (s)": runtime
            }),
            RowSchema::Standard,
        )
        .unwrap()
    }

    #[test]
    fn test_rounds_alias_gives_same_key() {
        let cycles = json!({
            "Cycles": 5, "L": 3, "p": 0.1, "Trials": 10, "Successes": 9,
            "Clear syndromes": 10, "Timeout": 1, "Job RunTime (s)": 1.0
        });
        let mut rounds = cycles.clone();
        let obj = rounds.as_object_mut().unwrap();
        obj.remove("Cycles");
        obj.insert("Rounds".to_string(), json!(5));

        let a = RunRecord::from_value(&cycles, RowSchema::Standard).unwrap();
        let b = RunRecord::from_value(&rounds, RowSchema::Standard).unwrap();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_missing_cycle_count() {
        let value = json!({
            "L": 3, "p": 0.1, "Trials": 10, "Successes": 9,
            "Clear syndromes": 10, "Timeout": 1, "Job RunTime (s)": 1.0
        });
        let err = RunRecord::from_value(&value, RowSchema::Standard).unwrap_err();
        assert!(matches!(err, RecordError::MissingCycleCount));
        assert!(!err.is_malformed());
    }

    #[test]
    fn test_boundary_fields_required_only_in_boundary_mode() {
        let value = json!({
            "Rounds": 2, "L": 5, "p": 0.01, "Trials": 10, "Successes": 9,
            "Clear syndromes": 10, "Timeout": 1.5, "Job RunTime (s)": 2.0
        });
        assert!(RunRecord::from_value(&value, RowSchema::Standard).is_ok());
        let err = RunRecord::from_value(&value, RowSchema::Boundary).unwrap_err();
        assert!(matches!(err, RecordError::MissingField("Sweep limit")));
    }

    #[test]
    fn test_integral_float_accepted_as_integer() {
        let value = json!({
            "Cycles": 4.0, "L": 7.0, "p": 0.02, "Trials": 10, "Successes": 9,
            "Clear syndromes": 10, "Timeout": 1, "Job RunTime (s)": 2
        });
        let rec = RunRecord::from_value(&value, RowSchema::Standard).unwrap();
        assert_eq!(rec.cycle_count, 4);
        assert_eq!(rec.lattice_size, 7);
        assert_eq!(rec.job_runtime_seconds, 2.0);
    }

    #[test]
    fn test_non_object_is_malformed() {
        let err = RunRecord::from_value(&json!([1, 2, 3]), RowSchema::Standard).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_bucket_scenario() {
        let mut bucket = Bucket::seed(&record(100, 90, 95, 10.0));
        bucket.merge(&record(50, 40, 48, 5.0));

        assert_eq!(bucket.trials, 150);
        assert_eq!(bucket.fails, 20);
        assert_eq!(bucket.timeouts, 7);
        assert_eq!(bucket.runtime_total, 15.0);
        assert_eq!(bucket.runtime_max, 10.0);
        assert_eq!(bucket.records, 2);

        let stats = bucket.stats();
        assert!((stats.failure_rate - 20.0 / 150.0).abs() < 1e-12);
        assert!((stats.standard_error - 0.0278).abs() < 1e-4);
        assert!((stats.timeout_fraction - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_zero_failures_timeout_fraction() {
        let bucket = Bucket::seed(&record(100, 100, 100, 1.0));
        let stats = bucket.stats();
        assert_eq!(stats.failure_rate, 0.0);
        assert_eq!(stats.standard_error, 0.0);
        assert_eq!(stats.timeout_fraction, 0.0);
    }

    #[test]
    fn test_first_limit_kept_and_disagreement_counted() {
        let mut bucket = Bucket::seed(&record(10, 9, 10, 1.0));
        assert!(bucket.disagreement().is_none());

        let mut other = record(10, 9, 10, 1.0);
        other.timeout_limit = Number::from(250);
        bucket.merge(&other);

        assert_eq!(bucket.timeout_limit.to_string(), "100");
        let d = bucket.disagreement().unwrap();
        assert_eq!(d.timeout_limits, 2);
        assert_eq!(d.sweep_schedules, 0);
    }

    #[test]
    fn test_sweep_disagreement_counted_in_boundary_mode() {
        let boundary = |cycles_key: &str, schedule: &str, limit: i64| {
            let mut value = json!({
                "L": 3, "p": 0.1, "Trials": 100, "Successes": 90, "Clear syndromes": 95,
                "Timeout": 1, "Job RunTime (s)": 10.0,
                "Sweep schedule": schedule, "Sweep limit": limit
            });
            value
                .as_object_mut()
                .unwrap()
                .insert(cycles_key.to_string(), json!(1));
            RunRecord::from_value(&value, RowSchema::Boundary).unwrap()
        };

        let mut bucket = Bucket::seed(&boundary("Cycles", "x", 2));
        bucket.merge(&boundary("Rounds", "y", 3));

        let sweep = bucket.sweep.clone().unwrap();
        assert_eq!(sweep.schedule, "x");
        assert_eq!(sweep.limit.to_string(), "2");
        assert_eq!(
            bucket.disagreement(),
            Some(Disagreement {
                records: 2,
                timeout_limits: 1,
                sweep_schedules: 2,
                sweep_limits: 2,
            })
        );
    }

    #[test]
    fn test_zero_trials_gives_zero_stats() {
        let bucket = Bucket::seed(&record(0, 0, 0, 0.0));
        let stats = bucket.stats();
        assert_eq!(stats.failure_rate, 0.0);
        assert_eq!(stats.standard_error, 0.0);
        assert_eq!(stats.timeout_fraction, 0.0);

        let rec = record(0, 0, 0, 0.0);
        let fields = SummaryRow::from_bucket(rec.key(), &bucket).fields();
        assert!(fields.iter().all(|f| !f.contains("NaN")));
        assert_eq!(fields[3], "0.0");
        assert_eq!(fields[4], "0.0");
    }

    #[test]
    fn test_negative_zero_rate_shares_bucket() {
        let mut neg = record(10, 9, 10, 1.0);
        neg.physical_error_rate = -0.0;
        let mut pos = record(10, 9, 10, 1.0);
        pos.physical_error_rate = 0.0;

        assert_eq!(neg.key(), pos.key());
        assert_eq!(neg.key().physical_error_rate.to_string(), "0.0");
    }

    #[test]
    fn test_key_ordering_is_n_then_l_then_p() {
        let key = |n, l, p| BucketKey {
            cycle_count: n,
            lattice_size: l,
            physical_error_rate: ErrorRate(p),
        };
        let mut keys = vec![key(2, 3, 0.1), key(1, 5, 0.01), key(1, 3, 0.2), key(1, 3, 0.05)];
        keys.sort();
        assert_eq!(
            keys,
            vec![key(1, 3, 0.05), key(1, 3, 0.2), key(1, 5, 0.01), key(2, 3, 0.1)]
        );
    }

    #[test]
    fn test_row_fields_match_headers() {
        let mut rec = record(100, 90, 95, 10.0);
        rec.sweep = Some(SweepSettings {
            limit: Number::from(4),
            schedule: "alternating".to_string(),
        });
        let bucket = Bucket::seed(&rec);

        let plain = Bucket::seed(&record(100, 90, 95, 10.0));
        let standard = SummaryRow::from_bucket(rec.key(), &plain);
        assert_eq!(standard.fields().len(), RowSchema::Standard.headers().len());

        let boundary = SummaryRow::from_bucket(rec.key(), &bucket);
        let fields = boundary.fields();
        assert_eq!(fields.len(), RowSchema::Boundary.headers().len());
        assert_eq!(fields[10], "alternating");
        assert_eq!(fields[11], "4");
        assert_eq!(fields[12], "10.0");
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(10.0), "10.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(0.35), "0.35");
    }
}
