//! Job Materializer
//!
//! Turns one sample vector into one runnable job: a rendered input artifact
//! on disk plus the `JobSpec` the graph emitter and the collector share.
//!
//! # Input formats
//!
//! - **Calibration**: the simulation's calibration table. One row per
//!   parameter with its change type, the sampled value and, for scoped
//!   parameters, the resolved unit ids. Consecutive id runs are compressed
//!   to `first -last`.
//! - **Template**: arbitrary text in which every `{{label}}` is replaced by
//!   the sampled value of the parameter with that label.
//!
//! Values are written with the shortest representation that parses back to
//! the identical `f64`.
//!
//! # Design
//!
//! - The template is borrowed immutably; each job gets its own artifact
//! - A scope that resolves to no unit fails only that job; the caller picks
//!   the batch policy

use crate::io_util::atomic_write;
use crate::problem::{ProblemDefinition, SpatialIndex, SpatialScope};
use crate::sampling::SampleVector;
use crate::types::ChangeType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// One runnable job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: String,
    pub sample_vector: SampleVector,
    pub input_artifact_path: PathBuf,
    pub output_directory: PathBuf,
}

/// Per-job materialization failures
#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Job {job_id}: scope '{scope}' of parameter '{parameter}' resolves to no spatial unit")]
    UnresolvedScope {
        job_id: String,
        parameter: String,
        scope: SpatialScope,
    },

    #[error("Template placeholder '{{{{{placeholder}}}}}' matches no parameter label")]
    UnknownPlaceholder { placeholder: String },

    #[error("Template has an unterminated placeholder at byte {offset}")]
    UnterminatedPlaceholder { offset: usize },

    #[error("Sample vector has {found} values for {expected} parameters")]
    WidthMismatch { found: usize, expected: usize },

    #[error("Malformed calibration artifact: {0}")]
    Malformed(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<MaterializeError> for crate::error::SweepError {
    fn from(err: MaterializeError) -> Self {
        match err {
            MaterializeError::Io { source, .. } => crate::error::SweepError::Io(source),
            other => crate::error::SweepError::Materialize(other.to_string()),
        }
    }
}

/// Base content every job input is rendered from
#[derive(Debug, Clone, PartialEq)]
pub enum InputTemplate {
    /// Calibration table with the given title line
    Calibration { title: String },
    /// Text with `{{label}}` placeholders
    Text(String),
}

impl Default for InputTemplate {
    fn default() -> Self {
        Self::Calibration {
            title: "calibration.cal".to_string(),
        }
    }
}

/// Renders and writes job input artifacts
#[derive(Debug, Clone)]
pub struct JobMaterializer {
    template: InputTemplate,
    spatial: SpatialIndex,
}

impl JobMaterializer {
    pub fn new(template: InputTemplate, spatial: SpatialIndex) -> Self {
        Self { template, spatial }
    }

    /// Render the input for one vector and write it to `input_path`.
    ///
    /// `output_dir` is created so the scheduler can transfer results into it.
    pub fn materialize(
        &self,
        job_id: &str,
        vector: &[f64],
        problem: &ProblemDefinition,
        input_path: &Path,
        output_dir: &Path,
    ) -> Result<JobSpec, MaterializeError> {
        let content = self.render(job_id, vector, problem)?;

        atomic_write(input_path, &content).map_err(|source| MaterializeError::Io {
            path: input_path.to_path_buf(),
            source,
        })?;
        fs::create_dir_all(output_dir).map_err(|source| MaterializeError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;
        debug!("Materialized {} -> {}", job_id, input_path.display());

        Ok(JobSpec {
            job_id: job_id.to_string(),
            sample_vector: vector.to_vec(),
            input_artifact_path: input_path.to_path_buf(),
            output_directory: output_dir.to_path_buf(),
        })
    }

    /// Render the input artifact text without touching the filesystem
    pub fn render(
        &self,
        job_id: &str,
        vector: &[f64],
        problem: &ProblemDefinition,
    ) -> Result<String, MaterializeError> {
        if vector.len() != problem.len() {
            return Err(MaterializeError::WidthMismatch {
                found: vector.len(),
                expected: problem.len(),
            });
        }
        match &self.template {
            InputTemplate::Calibration { title } => {
                self.render_calibration(title, job_id, vector, problem)
            }
            InputTemplate::Text(text) => render_text(text, vector, problem),
        }
    }

    fn render_calibration(
        &self,
        title: &str,
        job_id: &str,
        vector: &[f64],
        problem: &ProblemDefinition,
    ) -> Result<String, MaterializeError> {
        let mut out = String::new();
        out.push_str(&format!("{}: {} written by sweepctl\n", title, job_id));
        out.push_str(&format!("{}\n", problem.len()));
        out.push_str(CALIBRATION_HEADER);
        out.push('\n');

        for (param, value) in problem.iter().zip(vector) {
            let units = match &param.scope {
                Some(scope) => {
                    let ids = self.spatial.resolve(scope).ok_or_else(|| {
                        MaterializeError::UnresolvedScope {
                            job_id: job_id.to_string(),
                            parameter: param.label(),
                            scope: scope.clone(),
                        }
                    })?;
                    compress_ids(ids)
                }
                None => Vec::new(),
            };
            out.push_str(&format!(
                "{:<16} {:>8} {:>24} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>8}",
                param.name,
                param.change_type,
                value,
                0,
                0,
                0,
                0,
                0,
                0,
                0,
                units.len()
            ));
            for token in &units {
                out.push(' ');
                out.push_str(token);
            }
            out.push('\n');
        }
        Ok(out)
    }
}

const CALIBRATION_HEADER: &str = "NAME             CHG_TYPE                      VAL  CONDS   LYR1   LYR2  YEAR1  YEAR2   DAY1   DAY2  OBJ_TOT";

fn render_text(
    template: &str,
    vector: &[f64],
    problem: &ProblemDefinition,
) -> Result<String, MaterializeError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut consumed = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or(MaterializeError::UnterminatedPlaceholder {
                offset: consumed + start,
            })?;
        let key = after[..end].trim();
        let index = problem
            .iter()
            .position(|p| p.label() == key)
            .ok_or_else(|| MaterializeError::UnknownPlaceholder {
                placeholder: key.to_string(),
            })?;
        out.push_str(&vector[index].to_string());

        let advance = start + 2 + end + 2;
        consumed += advance;
        rest = &rest[advance..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Sorted unit ids as calibration tokens; consecutive runs become `first -last`
pub fn compress_ids(ids: &[u64]) -> Vec<String> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let first = sorted[i];
        let mut last = first;
        while i + 1 < sorted.len() && sorted[i + 1] == last + 1 {
            i += 1;
            last = sorted[i];
        }
        tokens.push(first.to_string());
        if last != first {
            tokens.push(format!("-{}", last));
        }
        i += 1;
    }
    tokens
}

fn expand_ids(tokens: &[&str]) -> Result<Vec<u64>, MaterializeError> {
    let mut ids: Vec<u64> = Vec::new();
    for token in tokens {
        if let Some(last) = token.strip_prefix('-') {
            let last: u64 = last
                .parse()
                .map_err(|_| MaterializeError::Malformed(format!("bad id range '{}'", token)))?;
            let first = ids
                .last()
                .copied()
                .ok_or_else(|| MaterializeError::Malformed("range without a start".to_string()))?;
            ids.extend(first + 1..=last);
        } else {
            ids.push(
                token
                    .parse()
                    .map_err(|_| MaterializeError::Malformed(format!("bad id '{}'", token)))?,
            );
        }
    }
    Ok(ids)
}

/// One parsed row of a calibration artifact
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRow {
    pub name: String,
    pub change_type: ChangeType,
    pub value: f64,
    pub units: Vec<u64>,
}

/// Read back the rows of a rendered calibration artifact
pub fn parse_calibration(text: &str) -> Result<Vec<CalibrationRow>, MaterializeError> {
    let mut lines = text.lines();
    lines.next(); // title
    let count: usize = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(|| MaterializeError::Malformed("missing parameter count".to_string()))?;
    lines.next(); // header

    let mut rows = Vec::with_capacity(count);
    for line in lines.take(count) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 11 {
            return Err(MaterializeError::Malformed(format!("short row '{}'", line)));
        }
        let change_type = fields[1]
            .parse::<ChangeType>()
            .map_err(|_| MaterializeError::Malformed(format!("bad change type '{}'", fields[1])))?;
        let value = fields[2]
            .parse::<f64>()
            .map_err(|_| MaterializeError::Malformed(format!("bad value '{}'", fields[2])))?;
        rows.push(CalibrationRow {
            name: fields[0].to_string(),
            change_type,
            value,
            units: expand_ids(&fields[11..])?,
        });
    }
    if rows.len() != count {
        return Err(MaterializeError::Malformed(format!(
            "expected {} rows, found {}",
            count,
            rows.len()
        )));
    }
    Ok(rows)
}
