//! Sensitivity Analyzer
//!
//! Recomputes per-parameter effect measures from the completed sweep table,
//! using the estimator that matches the design that produced the samples.
//!
//! # Design
//!
//! - **Matched estimators**: FAST samples are analyzed with the FAST
//!   estimator and Morris samples with the Morris estimator. Any other
//!   pairing, or a matrix whose shape the design cannot have produced, is an
//!   analysis mismatch and aborts the step.
//! - **Per-column NA exclusion**: a run that is NA for one indicator is only
//!   excluded from that indicator's analysis.
//! - **Deterministic**: bootstrap draws are seeded from the sample seed.
//! - **Ranking**: parameters are totally ordered by effect magnitude (FAST
//!   `st`, Morris `mu_star`), ties keep input order, undefined values last.

pub mod fast;
pub mod morris;
pub mod stats;

use crate::collect::{IndicatorTable, TableKind};
use crate::error::{Result, SweepError};
use crate::io_util::atomic_write_bytes;
use crate::problem::ProblemDefinition;
use crate::sample_store::SampleManifest;
use crate::sampling::{SampleMatrix, StrategyConfig};
use crate::types::StrategyKind;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Knobs for confidence bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSettings {
    pub conf_level: f64,
    pub num_resamples: usize,
    pub seed: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            conf_level: 0.95,
            num_resamples: 100,
            seed: 0,
        }
    }
}

/// Effect measures of one parameter for one indicator
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EffectMeasures {
    Fast {
        s1: f64,
        s1_conf: f64,
        st: f64,
        st_conf: f64,
    },
    Morris {
        mu: f64,
        mu_star: f64,
        sigma: f64,
        mu_star_conf: f64,
    },
}

impl EffectMeasures {
    /// Value the ranking is based on
    pub fn magnitude(&self) -> f64 {
        match self {
            Self::Fast { st, .. } => *st,
            Self::Morris { mu_star, .. } => *mu_star,
        }
    }

    fn columns(&self) -> (&'static [&'static str], Vec<f64>) {
        match *self {
            Self::Fast {
                s1,
                s1_conf,
                st,
                st_conf,
            } => (&["s1", "s1_conf", "st", "st_conf"], vec![s1, s1_conf, st, st_conf]),
            Self::Morris {
                mu,
                mu_star,
                sigma,
                mu_star_conf,
            } => (
                &["mu", "mu_star", "sigma", "mu_star_conf"],
                vec![mu, mu_star, sigma, mu_star_conf],
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterEffect {
    pub parameter: String,
    #[serde(flatten)]
    pub measures: EffectMeasures,
}

/// Analysis of one indicator column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityIndex {
    pub method: StrategyKind,
    pub runs_used: usize,
    pub runs_excluded: usize,
    pub parameters: Vec<ParameterEffect>,
    /// Parameter labels, largest effect first
    pub ranking: Vec<String>,
}

/// Full result, keyed by indicator name
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SensitivityReport {
    pub indicators: BTreeMap<String, SensitivityIndex>,
    /// Indicators with no usable run
    pub skipped: Vec<String>,
}

impl SensitivityReport {
    pub fn get(&self, indicator: &str) -> Option<&SensitivityIndex> {
        self.indicators.get(indicator)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write_bytes(path, json.as_bytes())?;
        Ok(())
    }

    /// Write one ranked CSV per indicator into `dir`; returns the paths
    pub fn write_ranked_reports(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let stems = report_stems(self.indicators.keys());
        let mut written = Vec::new();
        for (indicator, index) in &self.indicators {
            let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
            let Some(first) = index.parameters.first() else {
                continue;
            };
            let (names, _) = first.measures.columns();
            let mut header = vec!["rank".to_string(), "parameter".to_string()];
            header.extend(names.iter().map(|s| s.to_string()));
            writer.write_record(&header)?;

            for (rank, label) in index.ranking.iter().enumerate() {
                let Some(effect) = index.parameters.iter().find(|p| &p.parameter == label) else {
                    continue;
                };
                let (_, values) = effect.measures.columns();
                let mut record = vec![(rank + 1).to_string(), label.clone()];
                record.extend(values.iter().map(|v| v.to_string()));
                writer.write_record(&record)?;
            }

            let bytes = writer
                .into_inner()
                .map_err(|e| SweepError::general(format!("failed to flush report: {}", e)))?;
            let path = dir.join(format!("sensitivity_{}.csv", stems[indicator.as_str()]));
            atomic_write_bytes(&path, &bytes)?;
            written.push(path);
        }
        Ok(written)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// File stem per indicator. Names that sanitize alike get `_2`, `_3`, ...
fn report_stems<'a>(indicators: impl Iterator<Item = &'a String>) -> BTreeMap<&'a str, String> {
    let mut used = HashSet::new();
    let mut stems = BTreeMap::new();
    for name in indicators {
        let base = sanitize(name);
        let mut stem = base.clone();
        let mut n = 1;
        while !used.insert(stem.clone()) {
            n += 1;
            stem = format!("{}_{}", base, n);
        }
        if n > 1 {
            warn!(
                "Indicator '{}' collides with another report file name; using sensitivity_{}.csv",
                name, stem
            );
        }
        stems.insert(name.as_str(), stem);
    }
    stems
}

/// Labels ordered by descending magnitude; stable, NaN last
pub fn rank(effects: &[ParameterEffect]) -> Vec<String> {
    let mut order: Vec<usize> = (0..effects.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (effects[a].measures.magnitude(), effects[b].measures.magnitude());
        match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        }
    });
    order.into_iter().map(|i| effects[i].parameter.clone()).collect()
}

/// Applies the estimator of one design to a completed sweep
#[derive(Debug, Clone)]
pub struct SensitivityAnalyzer {
    method: StrategyKind,
    settings: AnalysisSettings,
}

impl SensitivityAnalyzer {
    pub fn new(method: StrategyKind, settings: AnalysisSettings) -> Self {
        Self { method, settings }
    }

    /// Analyzer matching the design recorded in `manifest`
    pub fn for_manifest(manifest: &SampleManifest, mut settings: AnalysisSettings) -> Self {
        settings.seed = manifest.seed;
        Self::new(manifest.strategy.kind(), settings)
    }

    pub fn method(&self) -> StrategyKind {
        self.method
    }

    /// Check that this estimator can interpret `matrix` and `table`
    fn check_design(
        &self,
        problem: &ProblemDefinition,
        strategy: &StrategyConfig,
        matrix: &SampleMatrix,
        table: &IndicatorTable,
    ) -> Result<()> {
        if !self.method.has_estimator() {
            return Err(SweepError::analysis(format!(
                "{} samples have no sensitivity estimator",
                self.method
            )));
        }
        if strategy.kind() != self.method {
            return Err(SweepError::analysis(format!(
                "{} estimator cannot analyze {} samples",
                self.method,
                strategy.kind()
            )));
        }
        if matrix.columns() != problem.len() {
            return Err(SweepError::analysis(format!(
                "matrix has {} columns for {} parameters",
                matrix.columns(),
                problem.len()
            )));
        }
        let expected = strategy.strategy().sample_count(problem.len());
        if matrix.len() != expected {
            return Err(SweepError::analysis(format!(
                "{} design with {} parameters produces {} rows, matrix has {}",
                self.method,
                problem.len(),
                expected,
                matrix.len()
            )));
        }
        if table.kind() != TableKind::Sweep || table.len() != matrix.len() {
            return Err(SweepError::analysis(format!(
                "indicator table has {} rows for {} samples",
                table.len(),
                matrix.len()
            )));
        }
        Ok(())
    }

    /// Compute indices for every indicator column of `table`
    pub fn analyze(
        &self,
        problem: &ProblemDefinition,
        strategy: &StrategyConfig,
        matrix: &SampleMatrix,
        table: &IndicatorTable,
    ) -> Result<SensitivityReport> {
        self.check_design(problem, strategy, matrix, table)?;

        let morris_steps = match strategy {
            StrategyConfig::Morris { .. } => Some(morris::trajectory_steps(problem, matrix)?),
            _ => None,
        };

        let mut report = SensitivityReport::default();
        for (column_idx, indicator) in table.indicators().iter().enumerate() {
            let outputs: Vec<Option<f64>> = table
                .rows()
                .iter()
                .map(|r| r.values[column_idx].as_f64())
                .collect();
            let used = outputs.iter().filter(|v| v.is_some()).count();
            let excluded = outputs.len() - used;

            if used == 0 {
                warn!("Indicator '{}' has no usable runs; skipping", indicator);
                report.skipped.push(indicator.clone());
                continue;
            }
            if excluded > 0 {
                warn!(
                    "Indicator '{}': excluding {} NA runs of {}",
                    indicator,
                    excluded,
                    outputs.len()
                );
            }

            let mut rng = SmallRng::seed_from_u64(
                self.settings.seed.wrapping_add(column_idx as u64),
            );
            let measures: Vec<EffectMeasures> = match (strategy, &morris_steps) {
                (StrategyConfig::Fast { samples, interference }, _) => outputs
                    .chunks(*samples)
                    .map(|block| {
                        let e = fast::estimate_block(block, *interference, &self.settings, &mut rng);
                        EffectMeasures::Fast {
                            s1: e.s1,
                            s1_conf: e.s1_conf,
                            st: e.st,
                            st_conf: e.st_conf,
                        }
                    })
                    .collect(),
                (StrategyConfig::Morris { .. }, Some(steps)) => {
                    morris::estimate(problem, steps, &outputs, &self.settings, &mut rng)
                        .into_iter()
                        .map(|e| EffectMeasures::Morris {
                            mu: e.mu,
                            mu_star: e.mu_star,
                            sigma: e.sigma,
                            mu_star_conf: e.mu_star_conf,
                        })
                        .collect()
                }
                _ => {
                    return Err(SweepError::analysis(format!(
                        "no estimator for {} samples",
                        strategy.kind()
                    )));
                }
            };

            let parameters: Vec<ParameterEffect> = problem
                .iter()
                .zip(measures)
                .map(|(p, measures)| ParameterEffect {
                    parameter: p.label(),
                    measures,
                })
                .collect();
            let ranking = rank(&parameters);
            info!(
                "Indicator '{}': most influential parameter is {}",
                indicator,
                ranking.first().map(String::as_str).unwrap_or("-")
            );

            report.indicators.insert(
                indicator.clone(),
                SensitivityIndex {
                    method: self.method,
                    runs_used: used,
                    runs_excluded: excluded,
                    parameters,
                    ranking,
                },
            );
        }

        Ok(report)
    }
}
