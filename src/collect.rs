//! Result Collector and Indicator Table
//!
//! Reads each job's result artifact after the scheduler barrier and turns the
//! batch into rows of the cumulative indicator table.
//!
//! # Partial failure
//!
//! A job whose artifact is absent, unreadable or malformed yields a record
//! whose indicators are all `NA`. Collection never aborts because of one job;
//! the number of missing jobs is logged once at the end.
//!
//! # Table layout
//!
//! | Mode  | Key columns            | Written                          |
//! |-------|------------------------|----------------------------------|
//! | loop  | `generation,job_id`    | appended once per generation     |
//! | sweep | `sample_index`         | whole, after the dedup broadcast |

use crate::error::{Result, SweepError};
use crate::generation::Generation;
use crate::io_util::atomic_write_bytes;
use crate::materialize::JobSpec;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Text written for a missing indicator value
pub const NA: &str = "NA";

// ============================================================================
// Values and records
// ============================================================================

/// One cell of the indicator table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Value(f64),
    Missing,
}

impl IndicatorValue {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::Missing => None,
        }
    }

    pub fn is_missing(self) -> bool {
        self == Self::Missing
    }

    /// Parse a table cell. Anything that is not a finite number is `NA`.
    pub fn parse(cell: &str) -> Self {
        match cell.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Self::Value(v),
            _ => Self::Missing,
        }
    }
}

impl fmt::Display for IndicatorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{}", v),
            Self::Missing => write!(f, "{}", NA),
        }
    }
}

/// Indicator values read for one job
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub job_id: String,
    pub values: BTreeMap<String, IndicatorValue>,
    /// False when no usable result artifact was found
    pub available: bool,
}

impl ResultRecord {
    pub fn missing(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            values: BTreeMap::new(),
            available: false,
        }
    }

    /// Value of `indicator`, `NA` when absent
    pub fn get(&self, indicator: &str) -> IndicatorValue {
        self.values
            .get(indicator)
            .copied()
            .unwrap_or(IndicatorValue::Missing)
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Reads the per-job result artifact named `result_file`
#[derive(Debug, Clone)]
pub struct ResultCollector {
    result_file: String,
}

impl ResultCollector {
    pub fn new(result_file: impl Into<String>) -> Self {
        Self {
            result_file: result_file.into(),
        }
    }

    /// Read the result artifact of every job, in order
    pub fn collect(&self, jobs: &[JobSpec]) -> Vec<ResultRecord> {
        let records: Vec<ResultRecord> = jobs.iter().map(|job| self.read_record(job)).collect();
        let missing = records.iter().filter(|r| !r.available).count();
        if missing > 0 {
            warn!(
                "{} of {} jobs have no usable result; recorded as {}",
                missing,
                records.len(),
                NA
            );
        }
        info!(
            "Collected results for {} jobs ({} missing)",
            records.len(),
            missing
        );
        records
    }

    /// Read one job's artifact; every failure becomes an all-NA record
    pub fn read_record(&self, job: &JobSpec) -> ResultRecord {
        let path = job.output_directory.join(&self.result_file);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                if e.kind() == io::ErrorKind::NotFound {
                    warn!("Job {}: result artifact {} not found", job.job_id, path.display());
                } else {
                    warn!("Job {}: cannot read {}: {}", job.job_id, path.display(), e);
                }
                return ResultRecord::missing(&job.job_id);
            }
        };

        let parsed = if self.is_json() {
            parse_json_result(&text, &job.job_id)
        } else {
            parse_scalar_result(&text, &self.indicator_stem())
        };

        match parsed {
            Some(values) => {
                debug!("Job {}: read {} indicators", job.job_id, values.len());
                ResultRecord {
                    job_id: job.job_id.clone(),
                    values,
                    available: true,
                }
            }
            None => {
                warn!("Job {}: malformed result artifact {}", job.job_id, path.display());
                ResultRecord::missing(&job.job_id)
            }
        }
    }

    fn is_json(&self) -> bool {
        Path::new(&self.result_file)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    /// Indicator name of a single-number artifact
    fn indicator_stem(&self) -> String {
        Path::new(&self.result_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("value")
            .to_string()
    }
}

fn parse_json_result(text: &str, job_id: &str) -> Option<BTreeMap<String, IndicatorValue>> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;

    let mut values = BTreeMap::new();
    for (name, raw) in object {
        let parsed = match raw {
            serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            serde_json::Value::String(s) => IndicatorValue::parse(s).as_f64(),
            _ => None,
        };
        let cell = match parsed {
            Some(v) => IndicatorValue::Value(v),
            None => {
                warn!("Job {}: indicator '{}' is not numeric ({}); using {}", job_id, name, raw, NA);
                IndicatorValue::Missing
            }
        };
        values.insert(name.clone(), cell);
    }
    Some(values)
}

fn parse_scalar_result(text: &str, indicator: &str) -> Option<BTreeMap<String, IndicatorValue>> {
    match IndicatorValue::parse(text) {
        IndicatorValue::Value(v) => Some(BTreeMap::from([(
            indicator.to_string(),
            IndicatorValue::Value(v),
        )])),
        IndicatorValue::Missing => None,
    }
}

/// Indicator columns for a batch: the configured list, else the sorted
/// union of what the records carry.
pub fn resolve_columns(configured: Option<&[String]>, records: &[ResultRecord]) -> Vec<String> {
    if let Some(columns) = configured {
        return columns.to_vec();
    }
    records
        .iter()
        .flat_map(|r| r.values.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ============================================================================
// Indicator table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Loop,
    Sweep,
}

impl TableKind {
    fn key_columns(self) -> &'static [&'static str] {
        match self {
            Self::Loop => &["generation", "job_id"],
            Self::Sweep => &["sample_index"],
        }
    }
}

/// Traceability key of a table row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Job { generation: Generation, job_id: String },
    Sample(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub key: RowKey,
    pub values: Vec<IndicatorValue>,
}

impl IndicatorRow {
    /// True when every indicator of this row is `NA`
    pub fn is_missing(&self) -> bool {
        self.values.iter().all(|v| v.is_missing())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorTable {
    kind: TableKind,
    indicators: Vec<String>,
    rows: Vec<IndicatorRow>,
}

impl IndicatorTable {
    pub fn new(kind: TableKind, indicators: Vec<String>) -> Self {
        Self {
            kind,
            indicators,
            rows: Vec::new(),
        }
    }

    /// Rows for one loop round, tagged with `generation`
    pub fn loop_fragment(
        generation: Generation,
        records: &[ResultRecord],
        indicators: Vec<String>,
    ) -> Self {
        let rows = records
            .iter()
            .map(|r| IndicatorRow {
                key: RowKey::Job {
                    generation,
                    job_id: r.job_id.clone(),
                },
                values: indicators.iter().map(|name| r.get(name)).collect(),
            })
            .collect();
        Self {
            kind: TableKind::Loop,
            indicators,
            rows,
        }
    }

    /// Sweep table with one row per original sample index
    pub fn sweep(records: &[ResultRecord], indicators: Vec<String>) -> Self {
        let rows = records
            .iter()
            .enumerate()
            .map(|(i, r)| IndicatorRow {
                key: RowKey::Sample(i),
                values: indicators.iter().map(|name| r.get(name)).collect(),
            })
            .collect();
        Self {
            kind: TableKind::Sweep,
            indicators,
            rows,
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows whose indicators are all `NA`
    pub fn missing_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.is_missing()).count()
    }

    /// Add every indicator of `wanted` that is not yet a column, in order.
    /// Existing rows get `NA` for the new columns. Returns the added names.
    pub fn widen(&mut self, wanted: &[String]) -> Vec<String> {
        let mut added = Vec::new();
        for name in wanted {
            if !self.indicators.contains(name) {
                self.indicators.push(name.clone());
                added.push(name.clone());
            }
        }
        for row in &mut self.rows {
            row.values
                .extend(std::iter::repeat_n(IndicatorValue::Missing, added.len()));
        }
        added
    }

    pub fn contains_generation(&self, generation: Generation) -> bool {
        self.rows
            .iter()
            .any(|r| matches!(&r.key, RowKey::Job { generation: g, .. } if *g == generation))
    }

    /// Append the rows of `other`; kind and columns must match
    pub fn extend(&mut self, other: IndicatorTable) -> Result<()> {
        if other.kind != self.kind || other.indicators != self.indicators {
            return Err(SweepError::validation(format!(
                "cannot append table with columns {:?} to table with columns {:?}",
                other.indicators, self.indicators
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Serialize as CSV
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

        let mut header: Vec<String> = self
            .kind
            .key_columns()
            .iter()
            .map(|s| s.to_string())
            .collect();
        header.extend(self.indicators.iter().cloned());
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = match &row.key {
                RowKey::Job { generation, job_id } => vec![generation.to_string(), job_id.clone()],
                RowKey::Sample(i) => vec![i.to_string()],
            };
            record.extend(row.values.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|e| SweepError::general(format!("failed to flush indicator table: {}", e)))
    }

    /// Parse CSV produced by `to_csv`
    pub fn from_csv(bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes);

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let kind = match header.first().map(String::as_str) {
            Some("generation") if header.get(1).map(String::as_str) == Some("job_id") => {
                TableKind::Loop
            }
            Some("sample_index") => TableKind::Sweep,
            _ => {
                return Err(SweepError::validation(format!(
                    "unrecognized indicator table header {:?}",
                    header
                )));
            }
        };
        let key_len = kind.key_columns().len();
        let indicators = header[key_len..].to_vec();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != header.len() {
                return Err(SweepError::validation(format!(
                    "indicator table row {} has {} fields, expected {}",
                    line + 1,
                    record.len(),
                    header.len()
                )));
            }
            let key = match kind {
                TableKind::Loop => RowKey::Job {
                    generation: Generation::new(parse_key(&record[0], line)?),
                    job_id: record[1].to_string(),
                },
                TableKind::Sweep => RowKey::Sample(parse_key(&record[0], line)?),
            };
            let values = record
                .iter()
                .skip(key_len)
                .map(IndicatorValue::parse)
                .collect();
            rows.push(IndicatorRow { key, values });
        }

        Ok(Self {
            kind,
            indicators,
            rows,
        })
    }

    /// Write the whole table atomically
    pub fn write(&self, path: &Path) -> Result<()> {
        atomic_write_bytes(path, &self.to_csv()?)?;
        Ok(())
    }

    /// Read a table; a missing file is `None`
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => Self::from_csv(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_key<T: std::str::FromStr>(cell: &str, line: usize) -> Result<T> {
    cell.trim().parse().map_err(|_| {
        SweepError::validation(format!(
            "indicator table row {} has invalid key '{}'",
            line + 1,
            cell
        ))
    })
}

// ============================================================================
// Cumulative loop table
// ============================================================================

/// Outcome of appending one generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { rows: usize },
    AlreadyPresent,
}

/// The loop workflow's append-only table on disk
#[derive(Debug, Clone)]
pub struct CumulativeTable {
    path: PathBuf,
}

impl CumulativeTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<IndicatorTable>> {
        IndicatorTable::read(&self.path)
    }

    /// Append one generation's records. Re-collecting a generation that is
    /// already present leaves the table untouched.
    pub fn append(
        &self,
        generation: Generation,
        records: &[ResultRecord],
        configured: Option<&[String]>,
    ) -> Result<AppendOutcome> {
        let existing = self.load()?;
        if let Some(table) = &existing {
            if table.kind() != TableKind::Loop {
                return Err(SweepError::validation(format!(
                    "{} is not a loop indicator table",
                    self.path.display()
                )));
            }
            if table.contains_generation(generation) {
                warn!(
                    "Generation {} already present in {}; skipping append",
                    generation,
                    self.path.display()
                );
                return Ok(AppendOutcome::AlreadyPresent);
            }
        }

        let wanted = resolve_columns(configured, records);
        let table = match existing {
            Some(mut table) => {
                let added = table.widen(&wanted);
                if !added.is_empty() {
                    warn!(
                        "Generation {} adds indicator columns {:?} to {}; earlier rows are {}",
                        generation,
                        added,
                        self.path.display(),
                        NA
                    );
                }
                let columns = table.indicators().to_vec();
                table.extend(IndicatorTable::loop_fragment(generation, records, columns))?;
                table
            }
            None => IndicatorTable::loop_fragment(generation, records, wanted),
        };
        let rows = records.len();

        let ignored: BTreeSet<&String> = records
            .iter()
            .flat_map(|r| r.values.keys())
            .filter(|name| !table.indicators().contains(*name))
            .collect();
        if !ignored.is_empty() {
            debug!("Indicators {:?} are not configured columns; not recorded", ignored);
        }

        table.write(&self.path)?;

        info!(
            "Appended {} rows for generation {} to {} ({} total)",
            rows,
            generation,
            self.path.display(),
            table.len()
        );
        Ok(AppendOutcome::Appended { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn jobs(root: &Path, n: usize) -> Vec<JobSpec> {
        (0..n)
            .map(|i| {
                let dir = root.join(format!("run_{i}"));
                fs::create_dir_all(&dir).unwrap();
                JobSpec {
                    job_id: format!("run_{i}"),
                    sample_vector: vec![i as f64],
                    input_artifact_path: dir.join("calibration.cal"),
                    output_directory: dir,
                }
            })
            .collect()
    }

    fn write_result(job: &JobSpec, json: &str) {
        fs::write(job.output_directory.join("model_performance.json"), json).unwrap();
    }

    #[test]
    fn test_missing_artifact_becomes_na_row() {
        let dir = tempdir().unwrap();
        let jobs = jobs(dir.path(), 5);
        for (i, job) in jobs.iter().enumerate() {
            if i != 3 {
                write_result(job, &format!(r#"{{"nse": {}, "kge": 0.5}}"#, i as f64 / 10.0));
            }
        }

        let records = ResultCollector::new("model_performance.json").collect(&jobs);
        let table = IndicatorTable::loop_fragment(
            Generation::new(1),
            &records,
            resolve_columns(None, &records),
        );

        assert_eq!(table.len(), 5);
        assert_eq!(table.missing_rows(), 1);
        assert!(table.rows()[3].is_missing());
        assert_eq!(table.indicators(), &["kge".to_string(), "nse".to_string()]);
    }

    #[test]
    fn test_malformed_and_non_numeric_values() {
        let dir = tempdir().unwrap();
        let jobs = jobs(dir.path(), 2);
        write_result(&jobs[0], "{not json");
        write_result(&jobs[1], r#"{"nse": "n/a", "pbias": "12.5"}"#);

        let records = ResultCollector::new("model_performance.json").collect(&jobs);
        assert!(!records[0].available);
        assert!(records[1].available);
        assert_eq!(records[1].get("nse"), IndicatorValue::Missing);
        assert_eq!(records[1].get("pbias"), IndicatorValue::Value(12.5));
    }

    #[test]
    fn test_scalar_result_file_uses_stem() {
        let dir = tempdir().unwrap();
        let jobs = jobs(dir.path(), 1);
        fs::write(jobs[0].output_directory.join("efficiency.txt"), "0.73\n").unwrap();

        let records = ResultCollector::new("efficiency.txt").collect(&jobs);
        assert_eq!(records[0].get("efficiency"), IndicatorValue::Value(0.73));
    }

    #[test]
    fn test_csv_round_trip_keeps_na() {
        let records = vec![
            ResultRecord {
                job_id: "run_0".into(),
                values: BTreeMap::from([("nse".to_string(), IndicatorValue::Value(0.1 + 0.2))]),
                available: true,
            },
            ResultRecord::missing("run_1"),
        ];
        let table = IndicatorTable::loop_fragment(Generation::new(2), &records, vec!["nse".into()]);
        let bytes = table.to_csv().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("generation,job_id,nse\n"));
        assert!(text.contains("2,run_1,NA"));

        let parsed = IndicatorTable::from_csv(&bytes).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_cumulative_append_is_idempotent() {
        let dir = tempdir().unwrap();
        let table = CumulativeTable::new(dir.path().join("all_results.csv"));
        let records: Vec<_> = (0..5)
            .map(|i| ResultRecord {
                job_id: format!("run_{i}"),
                values: BTreeMap::from([("nse".to_string(), IndicatorValue::Value(i as f64))]),
                available: true,
            })
            .collect();

        for g in 1..=3 {
            assert_eq!(
                table.append(Generation::new(g), &records, None).unwrap(),
                AppendOutcome::Appended { rows: 5 }
            );
        }
        assert_eq!(
            table.append(Generation::new(2), &records, None).unwrap(),
            AppendOutcome::AlreadyPresent
        );

        let loaded = table.load().unwrap().unwrap();
        assert_eq!(loaded.len(), 15);
        let keys: BTreeSet<_> = loaded.rows().iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys.len(), 15);
    }

    #[test]
    fn test_sweep_header() {
        let records = vec![ResultRecord::missing("sim_1")];
        let table = IndicatorTable::sweep(&records, vec!["nse".into()]);
        let text = String::from_utf8(table.to_csv().unwrap()).unwrap();
        assert_eq!(text, "sample_index,nse\n0,NA\n");
    }

    #[test]
    fn test_configured_columns_win() {
        let records = vec![ResultRecord {
            job_id: "run_0".into(),
            values: BTreeMap::from([("b".to_string(), IndicatorValue::Value(1.0))]),
            available: true,
        }];
        let configured = vec!["a".to_string()];
        assert_eq!(resolve_columns(Some(&configured), &records), configured);
        assert_eq!(resolve_columns(None, &records), vec!["b".to_string()]);
    }

    fn record(job_id: &str, values: &[(&str, f64)]) -> ResultRecord {
        ResultRecord {
            job_id: job_id.into(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), IndicatorValue::Value(*v)))
                .collect(),
            available: true,
        }
    }

    #[test]
    fn test_all_missing_first_round_does_not_fix_schema() {
        let dir = tempdir().unwrap();
        let table = CumulativeTable::new(dir.path().join("all_results.csv"));

        let failed = vec![ResultRecord::missing("run_0"), ResultRecord::missing("run_1")];
        table.append(Generation::new(1), &failed, None).unwrap();
        let ok = vec![record("run_0", &[("nse", 0.5)]), record("run_1", &[("nse", 0.25)])];
        table.append(Generation::new(2), &ok, None).unwrap();

        let loaded = table.load().unwrap().unwrap();
        assert_eq!(loaded.indicators(), &["nse".to_string()]);
        assert_eq!(loaded.len(), 4);
        assert!(loaded.rows()[0].is_missing());
        assert_eq!(loaded.rows()[2].values, vec![IndicatorValue::Value(0.5)]);
    }

    #[test]
    fn test_later_indicator_widens_table() {
        let dir = tempdir().unwrap();
        let table = CumulativeTable::new(dir.path().join("all_results.csv"));

        table
            .append(Generation::new(1), &[record("run_0", &[("nse", 0.1)])], None)
            .unwrap();
        table
            .append(
                Generation::new(2),
                &[record("run_0", &[("nse", 0.2), ("kge", 0.3)])],
                None,
            )
            .unwrap();

        let text = fs::read_to_string(table.path()).unwrap();
        assert_eq!(text, "generation,job_id,nse,kge\n1,run_0,0.1,NA\n2,run_0,0.2,0.3\n");
    }

    #[test]
    fn test_configured_columns_extend_existing_header() {
        let dir = tempdir().unwrap();
        let table = CumulativeTable::new(dir.path().join("all_results.csv"));
        let records = vec![record("run_0", &[("nse", 0.1), ("pbias", 2.0)])];

        table.append(Generation::new(1), &records, None).unwrap();
        let configured = vec!["pbias".to_string(), "rsr".to_string()];
        assert_eq!(
            table
                .append(Generation::new(2), &records, Some(&configured))
                .unwrap(),
            AppendOutcome::Appended { rows: 1 }
        );

        let loaded = table.load().unwrap().unwrap();
        assert_eq!(
            loaded.indicators(),
            &["nse".to_string(), "pbias".to_string(), "rsr".to_string()]
        );
        assert_eq!(
            loaded.rows()[1].values,
            vec![
                IndicatorValue::Value(0.1),
                IndicatorValue::Value(2.0),
                IndicatorValue::Missing
            ]
        );
    }
}
