//! Job graph emission for the external scheduler
//!
//! Writes an HTCondor DAGMan description with one independent node per job
//! and keeps a single "current graph" pointer record up to date.
//!
//! ```text
//! JOB run_0 worker.sub
//! VARS run_0 ParamFile="runs/gen_1/run_0/calibration.cal"
//! VARS run_0 ResultDir="runs/gen_1/run_0"
//! VARS run_0 NodeName="run_0"
//! VARS run_0 GenNum="1"
//! ```
//!
//! Paths are written relative to the graph's directory, which is where the
//! scheduler is submitted from.
//!
//! The pointer is a small text record holding the current graph's file name.
//! It is replaced by write-then-rename, so a reader sees either the previous
//! graph or the new one, never neither.

use crate::generation::Generation;
use crate::io_util::{atomic_write, relative_to};
use crate::materialize::JobSpec;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Graph file name for a loop round
pub fn generation_graph_name(generation: Generation) -> String {
    format!("worker_jobs_gen_{}.dag", generation)
}

/// Graph file name for a one-shot sweep
pub const SWEEP_GRAPH_NAME: &str = "worker_jobs_sweep.dag";

/// Reference to an emitted graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphHandle {
    pub name: String,
    pub path: PathBuf,
    pub node_count: usize,
}

#[derive(Debug, Clone)]
pub struct JobGraphEmitter {
    graph_dir: PathBuf,
    submit_file: String,
    pointer_path: PathBuf,
}

impl JobGraphEmitter {
    pub fn new(
        graph_dir: impl Into<PathBuf>,
        submit_file: impl Into<String>,
        pointer_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            graph_dir: graph_dir.into(),
            submit_file: submit_file.into(),
            pointer_path: pointer_path.into(),
        }
    }

    pub fn pointer_path(&self) -> &Path {
        &self.pointer_path
    }

    /// Render the graph text for `jobs`
    pub fn render(&self, jobs: &[JobSpec], generation: Option<Generation>) -> String {
        let mut out = String::new();
        for job in jobs {
            let node = &job.job_id;
            let param = relative_to(&job.input_artifact_path, &self.graph_dir);
            let result = relative_to(&job.output_directory, &self.graph_dir);

            out.push_str(&format!("JOB {} {}\n", node, self.submit_file));
            out.push_str(&format!("VARS {} ParamFile=\"{}\"\n", node, param.display()));
            out.push_str(&format!("VARS {} ResultDir=\"{}\"\n", node, result.display()));
            out.push_str(&format!("VARS {} NodeName=\"{}\"\n", node, node));
            if let Some(g) = generation {
                out.push_str(&format!("VARS {} GenNum=\"{}\"\n", node, g));
            }
            out.push('\n');
        }
        out
    }

    /// Write the graph as `name` and make it the current graph
    pub fn emit(
        &self,
        name: &str,
        jobs: &[JobSpec],
        generation: Option<Generation>,
    ) -> io::Result<GraphHandle> {
        let path = self.graph_dir.join(name);
        atomic_write(&path, &self.render(jobs, generation))?;
        self.set_current(name)?;

        info!("Emitted job graph {} with {} nodes", path.display(), jobs.len());
        Ok(GraphHandle {
            name: name.to_string(),
            path,
            node_count: jobs.len(),
        })
    }

    /// Replace the current-graph pointer in one step
    pub fn set_current(&self, name: &str) -> io::Result<()> {
        atomic_write(&self.pointer_path, &format!("{}\n", name))
    }

    /// Name of the current graph, if a pointer exists
    pub fn current(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.pointer_path) {
            Ok(content) => {
                let name = content.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Path of the current graph, if a pointer exists
    pub fn current_path(&self) -> io::Result<Option<PathBuf>> {
        Ok(self.current()?.map(|name| self.graph_dir.join(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn job(root: &Path, i: usize) -> JobSpec {
        let dir = root.join("runs/gen_1").join(format!("run_{i}"));
        JobSpec {
            job_id: format!("run_{i}"),
            sample_vector: vec![i as f64],
            input_artifact_path: dir.join("calibration.cal"),
            output_directory: dir,
        }
    }

    #[test]
    fn test_render_binds_variables() {
        let dir = tempdir().unwrap();
        let emitter = JobGraphEmitter::new(dir.path(), "worker.sub", dir.path().join("current"));
        let text = emitter.render(&[job(dir.path(), 0)], Some(Generation::new(1)));

        assert!(text.contains("JOB run_0 worker.sub\n"));
        assert!(text.contains("VARS run_0 ParamFile=\"runs/gen_1/run_0/calibration.cal\"\n"));
        assert!(text.contains("VARS run_0 ResultDir=\"runs/gen_1/run_0\"\n"));
        assert!(text.contains("VARS run_0 GenNum=\"1\"\n"));
    }

    #[test]
    fn test_sweep_graph_has_no_generation() {
        let dir = tempdir().unwrap();
        let emitter = JobGraphEmitter::new(dir.path(), "worker.sub", dir.path().join("current"));
        let text = emitter.render(&[job(dir.path(), 0)], None);
        assert!(!text.contains("GenNum"));
    }

    #[test]
    fn test_emit_moves_pointer() {
        let dir = tempdir().unwrap();
        let emitter = JobGraphEmitter::new(
            dir.path(),
            "worker.sub",
            dir.path().join("worker_jobs_current"),
        );
        assert_eq!(emitter.current().unwrap(), None);

        let jobs: Vec<_> = (0..3).map(|i| job(dir.path(), i)).collect();
        let first = emitter
            .emit(&generation_graph_name(Generation::new(1)), &jobs, Some(Generation::new(1)))
            .unwrap();
        assert_eq!(first.node_count, 3);
        assert_eq!(emitter.current().unwrap().as_deref(), Some("worker_jobs_gen_1.dag"));

        emitter
            .emit(&generation_graph_name(Generation::new(2)), &jobs, Some(Generation::new(2)))
            .unwrap();
        assert_eq!(
            emitter.current_path().unwrap(),
            Some(dir.path().join("worker_jobs_gen_2.dag"))
        );
        // Earlier graphs stay on disk for traceability
        assert!(first.path.exists());
    }
}
