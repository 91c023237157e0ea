//! Workflow configuration file handling.
//!
//! One JSON file describes a whole workflow instance: the sampling strategy
//! (which also selects loop or sweep mode), where the problem definition and
//! spatial groups live, how job inputs are rendered, and the names of every
//! artifact the orchestrator and the scheduler exchange. Relative paths are
//! resolved against the directory holding the file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::AnalysisSettings;
use crate::materialize::InputTemplate;
use crate::problem::{ProblemDefinition, SpatialIndex};
use crate::sampling::StrategyConfig;
use crate::types::InputFormat;

/// Default workflow file name looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "sweep.json";

/// How each job's input artifact is rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub format: InputFormat,
    /// File name of the rendered artifact inside each job directory
    pub file_name: String,
    /// Template text file (template format only)
    pub template: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            format: InputFormat::Calibration,
            file_name: "calibration.cal".to_string(),
            template: None,
        }
    }
}

/// Confidence-bound and report settings for sweep analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub conf_level: f64,
    pub num_resamples: usize,
    /// Also write one ranked CSV per indicator
    pub report: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            conf_level: 0.95,
            num_resamples: 100,
            report: false,
        }
    }
}

/// Names of the artifacts shared with the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileNames {
    pub state: String,
    pub signal: String,
    pub results: String,
    pub sweep_results: String,
    pub current_graph: String,
    pub sample_matrix: String,
    pub manifest: String,
    pub sensitivity: String,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            state: "iteration.state".to_string(),
            signal: "continue_signal.txt".to_string(),
            results: "all_results.csv".to_string(),
            sweep_results: "model_performances_all.csv".to_string(),
            current_graph: "worker_jobs_current".to_string(),
            sample_matrix: "samples.bin".to_string(),
            manifest: "samples.json".to_string(),
            sensitivity: "sensitivity_result.json".to_string(),
        }
    }
}

impl FileNames {
    fn all(&self) -> [(&'static str, &str); 8] {
        [
            ("state", self.state.as_str()),
            ("signal", self.signal.as_str()),
            ("results", self.results.as_str()),
            ("sweep_results", self.sweep_results.as_str()),
            ("current_graph", self.current_graph.as_str()),
            ("sample_matrix", self.sample_matrix.as_str()),
            ("manifest", self.manifest.as_str()),
            ("sensitivity", self.sensitivity.as_str()),
        ]
    }
}

/// Complete workflow configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub strategy: StrategyConfig,
    /// Fixed seed; a fresh one is drawn and recorded when absent
    pub seed: Option<u64>,
    pub problem_file: PathBuf,
    /// Object type → group file, e.g. `"hru": "hru_groups.json"`
    pub spatial_groups: BTreeMap<String, PathBuf>,
    pub input: InputConfig,
    pub runs_dir: PathBuf,
    pub submit_file: String,
    /// Result artifact looked up in every job's output directory
    pub result_file: String,
    /// Fixed indicator column list
    pub indicators: Option<Vec<String>>,
    pub analysis: AnalysisConfig,
    pub files: FileNames,

    /// Directory relative paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig::default(),
            seed: None,
            problem_file: PathBuf::from("problem.txt"),
            spatial_groups: BTreeMap::new(),
            input: InputConfig::default(),
            runs_dir: PathBuf::from("runs"),
            submit_file: "worker.sub".to_string(),
            result_file: "model_performance.json".to_string(),
            indicators: None,
            analysis: AnalysisConfig::default(),
            files: FileNames::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow configuration from {:?}", path))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse workflow configuration {:?}", path))?;

        config.base_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize workflow configuration to JSON")?;
        fs::write(&path, json).with_context(|| {
            format!("Failed to write workflow configuration to {:?}", path.as_ref())
        })?;
        Ok(())
    }

    /// Same configuration, resolving relative paths against `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Validate everything that can be checked without reading other files
    pub fn validate(&self) -> Result<()> {
        self.strategy
            .validate()
            .context("Invalid sampling strategy")?;

        if !(self.analysis.conf_level > 0.0 && self.analysis.conf_level < 1.0) {
            bail!(
                "analysis.conf_level must lie strictly between 0 and 1 (got {})",
                self.analysis.conf_level
            );
        }

        if self.submit_file.trim().is_empty() {
            bail!("submit_file must be specified");
        }
        if self.result_file.trim().is_empty() {
            bail!("result_file must be specified");
        }
        if self.input.file_name.trim().is_empty() {
            bail!("input.file_name must be specified");
        }
        if self.input.format == InputFormat::Template && self.input.template.is_none() {
            bail!("input.template is required when input.format is \"template\"");
        }

        if let Some(indicators) = &self.indicators {
            if indicators.is_empty() {
                bail!("indicators, when given, must name at least one column");
            }
            let mut seen = HashSet::new();
            for name in indicators {
                if matches!(name.as_str(), "generation" | "job_id" | "sample_index") {
                    bail!("indicator name '{}' collides with a key column", name);
                }
                if !seen.insert(name) {
                    bail!("indicator '{}' is listed twice", name);
                }
            }
        }

        let mut names = HashSet::new();
        for (field, name) in self.files.all() {
            if name.trim().is_empty() {
                bail!("files.{} must not be empty", field);
            }
            if !names.insert(name) {
                bail!("files.{} reuses the file name '{}'", field, name);
            }
        }

        Ok(())
    }

    /// Resolve a configured path against the workflow directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn in_base(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    pub fn problem_path(&self) -> PathBuf {
        self.resolve(&self.problem_file)
    }

    pub fn runs_path(&self) -> PathBuf {
        self.resolve(&self.runs_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        self.in_base(&self.files.state)
    }

    pub fn signal_path(&self) -> PathBuf {
        self.in_base(&self.files.signal)
    }

    pub fn results_path(&self) -> PathBuf {
        self.in_base(&self.files.results)
    }

    pub fn sweep_results_path(&self) -> PathBuf {
        self.in_base(&self.files.sweep_results)
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.in_base(&self.files.current_graph)
    }

    pub fn sensitivity_path(&self) -> PathBuf {
        self.in_base(&self.files.sensitivity)
    }

    /// Load and parse the problem definition
    pub fn load_problem(&self) -> crate::Result<ProblemDefinition> {
        ProblemDefinition::load(&self.problem_path())
    }

    /// Load every configured spatial group file
    pub fn load_spatial_index(&self) -> crate::Result<SpatialIndex> {
        let mut index = SpatialIndex::new();
        for (object_type, path) in &self.spatial_groups {
            index.load_groups(object_type, &self.resolve(path))?;
        }
        Ok(index)
    }

    /// Build the input template, reading the template file when needed
    pub fn input_template(&self) -> Result<InputTemplate> {
        match self.input.format {
            InputFormat::Calibration => Ok(InputTemplate::Calibration {
                title: self.input.file_name.clone(),
            }),
            InputFormat::Template => {
                let Some(template) = &self.input.template else {
                    bail!("input.template is required when input.format is \"template\"");
                };
                let path = self.resolve(template);
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read input template {:?}", path))?;
                Ok(InputTemplate::Text(text))
            }
        }
    }

    /// Analysis settings seeded with `seed`
    pub fn analysis_settings(&self, seed: u64) -> AnalysisSettings {
        AnalysisSettings {
            conf_level: self.analysis.conf_level,
            num_resamples: self.analysis.num_resamples,
            seed,
        }
    }
}
