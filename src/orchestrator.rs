//! Workflow Orchestrator
//!
//! Drives one step of a workflow per invocation. The external scheduler sits
//! between `prepare` and `collect`; nothing here waits for jobs.
//!
//! # Loop mode (bounded_random)
//!
//! ```text
//! prepare:  state g → sample(seed+g+1) → materialize gen_{g+1} → save → emit → state g+1
//! collect:  state g (required) → read gen_g results → append table → decide
//! ```
//!
//! # Sweep mode (fast, morris)
//!
//! ```text
//! prepare:  sample → dedup → materialize unique vectors → save matrix → emit
//! collect:  load matrix → dedup → read unique results → broadcast → analyze
//! ```
//!
//! # Failure policy
//!
//! - Configuration errors abort before any job is materialized
//! - A job that cannot be materialized is logged and left out of the graph;
//!   the step aborts only when no job at all could be materialized
//! - Missing results become NA rows

use crate::analysis::{SensitivityAnalyzer, SensitivityReport};
use crate::collect::{
    resolve_columns, AppendOutcome, CumulativeTable, IndicatorTable, ResultCollector, ResultRecord,
};
use crate::config_file::WorkflowConfig;
use crate::continuation::{ContinuationDecider, ContinuationSignal};
use crate::error::{Result, SweepError};
use crate::generation::{Generation, GenerationStateStore};
use crate::job_graph::{generation_graph_name, GraphHandle, JobGraphEmitter, SWEEP_GRAPH_NAME};
use crate::materialize::{JobMaterializer, JobSpec};
use crate::problem::{ProblemDefinition, SkippedLine};
use crate::sample_store::{SampleManifest, SampleStore};
use crate::sampling::{self, SampleMatrix, UniqueSampleSet};
use crate::types::WorkflowMode;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// Job layout
// ============================================================================

/// Where each job's input and output live under the runs directory
#[derive(Debug, Clone)]
pub struct JobLayout {
    runs_dir: PathBuf,
    input_name: String,
}

impl JobLayout {
    pub fn new(runs_dir: impl Into<PathBuf>, input_name: impl Into<String>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            input_name: input_name.into(),
        }
    }

    /// `runs/gen_<g>`
    pub fn generation_dir(&self, generation: Generation) -> PathBuf {
        self.runs_dir.join(format!("gen_{}", generation))
    }

    /// Loop job `i` of `generation`: input and output share `run_<i>`
    pub fn loop_job(&self, generation: Generation, index: usize) -> (String, PathBuf, PathBuf) {
        let job_id = format!("run_{}", index);
        let dir = self.generation_dir(generation).join(&job_id);
        (job_id, dir.join(&self.input_name), dir)
    }

    /// Sweep job for unique vector `k` (1-based)
    pub fn sweep_job(&self, k: usize) -> (String, PathBuf, PathBuf) {
        let job_id = format!("sim_{}", k);
        let input = self.runs_dir.join(&job_id).join(&self.input_name);
        (job_id, input, self.runs_dir.join(format!("results_{}", k)))
    }

    /// JobSpecs of a persisted loop matrix, one per row
    pub fn loop_jobs(&self, generation: Generation, matrix: &SampleMatrix) -> Vec<JobSpec> {
        matrix
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let (job_id, input, output) = self.loop_job(generation, i);
                JobSpec {
                    job_id,
                    sample_vector: row.clone(),
                    input_artifact_path: input,
                    output_directory: output,
                }
            })
            .collect()
    }

    /// JobSpecs of a unique sample set, one per distinct vector
    pub fn sweep_jobs(&self, unique: &UniqueSampleSet) -> Vec<JobSpec> {
        unique
            .vectors()
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let (job_id, input, output) = self.sweep_job(idx + 1);
                JobSpec {
                    job_id,
                    sample_vector: row.clone(),
                    input_artifact_path: input,
                    output_directory: output,
                }
            })
            .collect()
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a `prepare` step
#[derive(Debug, Clone)]
pub enum PrepareOutcome {
    Generation {
        generation: Generation,
        graph: GraphHandle,
        jobs: usize,
        skipped: usize,
    },
    Sweep {
        graph: GraphHandle,
        samples: usize,
        unique: usize,
        skipped: usize,
    },
}

/// Result of a `collect` step
#[derive(Debug, Clone)]
pub enum CollectOutcome {
    Generation {
        generation: Generation,
        appended: AppendOutcome,
        missing: usize,
        signal: ContinuationSignal,
    },
    Sweep {
        rows: usize,
        missing: usize,
        report: SensitivityReport,
    },
}

/// Snapshot for the `status` command
#[derive(Debug, Clone)]
pub struct WorkflowStatus {
    pub mode: WorkflowMode,
    pub generation: Generation,
    pub max_generations: Option<u32>,
    pub current_graph: Option<String>,
    pub signal: ContinuationSignal,
    pub table_rows: Option<usize>,
}

/// Findings of the `validate` command
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub parameters: usize,
    pub skipped_lines: Vec<SkippedLine>,
    pub unresolved_scopes: Vec<String>,
    pub samples_per_batch: usize,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    config: WorkflowConfig,
    layout: JobLayout,
    emitter: JobGraphEmitter,
    state: GenerationStateStore,
    collector: ResultCollector,
}

impl Orchestrator {
    /// Validate `config` and build every component from it
    pub fn new(config: WorkflowConfig) -> Result<Self> {
        config.validate()?;
        let layout = JobLayout::new(config.runs_path(), config.input.file_name.clone());
        let emitter = JobGraphEmitter::new(
            config.base_dir(),
            config.submit_file.clone(),
            config.pointer_path(),
        );
        let state = GenerationStateStore::new(config.state_path());
        let collector = ResultCollector::new(config.result_file.clone());
        Ok(Self {
            config,
            layout,
            emitter,
            state,
            collector,
        })
    }

    /// Load a workflow file and build the orchestrator
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::new(WorkflowConfig::load_from_file(path)?)
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn mode(&self) -> WorkflowMode {
        self.config.strategy.kind().mode()
    }

    pub fn prepare(&self) -> Result<PrepareOutcome> {
        match self.mode() {
            WorkflowMode::Loop => self.prepare_generation(),
            WorkflowMode::Sweep => self.prepare_sweep(),
        }
    }

    pub fn collect(&self) -> Result<CollectOutcome> {
        match self.mode() {
            WorkflowMode::Loop => self.collect_generation(),
            WorkflowMode::Sweep => self.collect_sweep(),
        }
    }

    /// Rewrite the continuation sentinel for `generation`
    pub fn decide(&self, generation: Generation) -> Result<ContinuationSignal> {
        Ok(self.decider()?.decide(generation)?)
    }

    fn decider(&self) -> Result<ContinuationDecider> {
        let max = self.config.strategy.max_generations().ok_or_else(|| {
            SweepError::config(format!(
                "{} workflows have no generation limit; decide applies to loop workflows only",
                self.config.strategy.kind()
            ))
        })?;
        Ok(ContinuationDecider::new(self.config.signal_path(), max))
    }

    fn seed(&self) -> u64 {
        match self.config.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                info!("No seed configured; drew seed {}", seed);
                seed
            }
        }
    }

    fn sample_store(&self, dir: &Path) -> SampleStore {
        SampleStore::in_dir(dir, &self.config.files.sample_matrix, &self.config.files.manifest)
    }

    /// Materialize every vector, skipping jobs that fail
    fn materialize_all(
        &self,
        problem: &ProblemDefinition,
        planned: Vec<(String, Vec<f64>, PathBuf, PathBuf)>,
    ) -> Result<(Vec<JobSpec>, usize)> {
        let materializer = JobMaterializer::new(
            self.config.input_template()?,
            self.config.load_spatial_index()?,
        );

        let total = planned.len();
        let mut jobs = Vec::with_capacity(total);
        for (job_id, vector, input, output) in planned {
            match materializer.materialize(&job_id, &vector, problem, &input, &output) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!("Skipping job {}: {}", job_id, e),
            }
        }

        let skipped = total - jobs.len();
        if jobs.is_empty() {
            return Err(SweepError::materialize(format!(
                "none of the {} jobs could be materialized",
                total
            )));
        }
        if skipped > 0 {
            warn!("{} of {} jobs skipped during materialization", skipped, total);
        }
        Ok((jobs, skipped))
    }

    // ------------------------------------------------------------------------
    // Loop mode
    // ------------------------------------------------------------------------

    fn prepare_generation(&self) -> Result<PrepareOutcome> {
        let started = Instant::now();
        let current = self.state.read_or_default()?;
        let generation = current.next()?;
        info!("Preparing generation {}", generation);

        let problem = self.config.load_problem()?;
        let base_seed = self.seed();
        let seed = base_seed.wrapping_add(u64::from(generation.value()));
        let matrix = sampling::generate(&problem, &self.config.strategy, seed)?;

        let planned = (0..matrix.len())
            .map(|i| {
                let (job_id, input, output) = self.layout.loop_job(generation, i);
                (job_id, matrix.rows()[i].clone(), input, output)
            })
            .collect();
        let (jobs, skipped) = self.materialize_all(&problem, planned)?;

        // Order matters: samples, then graph and pointer, then state. A
        // failure at any step leaves the previous round's pointer and state.
        let manifest = SampleManifest::new(
            self.config.strategy.clone(),
            seed,
            Some(generation),
            problem,
            matrix.len(),
            matrix.len(),
            started.elapsed().as_secs_f64(),
        );
        self.sample_store(&self.layout.generation_dir(generation))
            .save(&matrix, &manifest)?;

        let graph = self.emitter.emit(
            &generation_graph_name(generation),
            &jobs,
            Some(generation),
        )?;

        self.state.write(generation)?;
        info!(
            "Generation {} ready: {} jobs in {}",
            generation,
            jobs.len(),
            graph.path.display()
        );

        Ok(PrepareOutcome::Generation {
            generation,
            graph,
            jobs: jobs.len(),
            skipped,
        })
    }

    fn collect_generation(&self) -> Result<CollectOutcome> {
        let generation = self.state.read_required()?;
        info!("Collecting generation {}", generation);

        let (matrix, manifest) = self
            .sample_store(&self.layout.generation_dir(generation))
            .load()?;
        if manifest.generation != Some(generation) {
            return Err(SweepError::state(format!(
                "sample manifest belongs to generation {:?}, state record says {}",
                manifest.generation.map(|g| g.value()),
                generation
            )));
        }

        let jobs = self.layout.loop_jobs(generation, &matrix);
        let records = self.collector.collect(&jobs);
        let missing = records.iter().filter(|r| !r.available).count();

        let table = CumulativeTable::new(self.config.results_path());
        let appended = table.append(generation, &records, self.config.indicators.as_deref())?;

        let signal = self.decide(generation)?;
        Ok(CollectOutcome::Generation {
            generation,
            appended,
            missing,
            signal,
        })
    }

    // ------------------------------------------------------------------------
    // Sweep mode
    // ------------------------------------------------------------------------

    fn prepare_sweep(&self) -> Result<PrepareOutcome> {
        let started = Instant::now();
        let problem = self.config.load_problem()?;
        let seed = self.seed();
        info!(
            "Preparing {} sweep over {} parameters",
            self.config.strategy.kind(),
            problem.len()
        );

        let matrix = sampling::generate(&problem, &self.config.strategy, seed)?;
        let unique = UniqueSampleSet::from_matrix(&matrix);
        info!(
            "Sampled {} vectors, {} unique ({} duplicates not submitted)",
            matrix.len(),
            unique.len(),
            unique.duplicate_count()
        );

        let planned = unique
            .vectors()
            .iter()
            .enumerate()
            .map(|(idx, vector)| {
                let (job_id, input, output) = self.layout.sweep_job(idx + 1);
                (job_id, vector.clone(), input, output)
            })
            .collect();
        let (jobs, skipped) = self.materialize_all(&problem, planned)?;

        // The graph is only published once collect can load its samples
        let manifest = SampleManifest::new(
            self.config.strategy.clone(),
            seed,
            None,
            problem,
            matrix.len(),
            unique.len(),
            started.elapsed().as_secs_f64(),
        );
        self.sample_store(&self.layout.runs_dir).save(&matrix, &manifest)?;

        let graph = self.emitter.emit(SWEEP_GRAPH_NAME, &jobs, None)?;

        Ok(PrepareOutcome::Sweep {
            graph,
            samples: matrix.len(),
            unique: unique.len(),
            skipped,
        })
    }

    fn collect_sweep(&self) -> Result<CollectOutcome> {
        let (matrix, manifest) = self.sample_store(&self.layout.runs_dir).load()?;
        if manifest.strategy != self.config.strategy {
            warn!(
                "Workflow strategy {:?} differs from the recorded sweep {:?}; analyzing with the recorded design",
                self.config.strategy, manifest.strategy
            );
        }

        let unique = UniqueSampleSet::from_matrix(&matrix);
        if unique.len() != manifest.unique_count {
            return Err(SweepError::analysis(format!(
                "manifest records {} unique vectors, matrix yields {}",
                manifest.unique_count,
                unique.len()
            )));
        }

        let jobs = self.layout.sweep_jobs(&unique);
        let unique_records = self.collector.collect(&jobs);
        let missing = unique_records.iter().filter(|r| !r.available).count();

        let rows: Vec<ResultRecord> = unique.broadcast(&unique_records)?;
        debug!("Broadcast {} unique results to {} rows", unique_records.len(), rows.len());

        let columns = resolve_columns(self.config.indicators.as_deref(), &unique_records);
        let table = IndicatorTable::sweep(&rows, columns);
        table.write(&self.config.sweep_results_path())?;
        info!(
            "Wrote {} rows to {}",
            table.len(),
            self.config.sweep_results_path().display()
        );

        let analyzer = SensitivityAnalyzer::new(
            self.config.strategy.kind(),
            self.config.analysis_settings(manifest.seed),
        );
        let report = analyzer.analyze(&manifest.problem, &manifest.strategy, &matrix, &table)?;
        report.write_json(&self.config.sensitivity_path())?;
        info!(
            "Sensitivity results for {} indicators written to {}",
            report.indicators.len(),
            self.config.sensitivity_path().display()
        );

        if self.config.analysis.report {
            let written = report.write_ranked_reports(self.config.base_dir())?;
            info!("Wrote {} ranked reports", written.len());
        }

        Ok(CollectOutcome::Sweep {
            rows: table.len(),
            missing,
            report,
        })
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn status(&self) -> Result<WorkflowStatus> {
        let generation = self.state.read_or_default()?;
        let signal = ContinuationDecider::new(self.config.signal_path(), 0).current()?;
        let table_path = match self.mode() {
            WorkflowMode::Loop => self.config.results_path(),
            WorkflowMode::Sweep => self.config.sweep_results_path(),
        };
        let table_rows = IndicatorTable::read(&table_path)?.map(|t| t.len());

        Ok(WorkflowStatus {
            mode: self.mode(),
            generation,
            max_generations: self.config.strategy.max_generations(),
            current_graph: self.emitter.current()?,
            signal,
            table_rows,
        })
    }

    /// Check the problem definition and spatial scopes without writing
    pub fn check(&self) -> Result<ValidationReport> {
        let path = self.config.problem_path();
        let text = fs::read_to_string(&path).map_err(|e| {
            SweepError::config(format!(
                "Failed to read problem definition {}: {}",
                path.display(),
                e
            ))
        })?;
        let (problem, skipped_lines) = ProblemDefinition::parse_report(&text)?;
        if problem.is_empty() {
            return Err(sampling::SamplingError::NoParameters.into());
        }
        let strategy = self.config.strategy.strategy();
        strategy.validate(problem.len())?;

        let spatial = self.config.load_spatial_index()?;
        let unresolved_scopes = problem
            .iter()
            .filter(|p| p.scope.as_ref().is_some_and(|s| spatial.resolve(s).is_none()))
            .map(|p| p.label())
            .collect();

        Ok(ValidationReport {
            parameters: problem.len(),
            skipped_lines,
            unresolved_scopes,
            samples_per_batch: strategy.sample_count(problem.len()),
        })
    }
}
