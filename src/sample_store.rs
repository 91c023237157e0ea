//! Sample matrix artifact and its manifest
//!
//! The matrix is persisted bit-exactly so that collection and analysis can be
//! re-run against the very samples that were materialized, without sampling
//! again. The manifest records everything needed to interpret it.
//!
//! # Binary layout
//!
//! ```text
//! offset  size      content
//! 0       8         magic "SWPMTX01"
//! 8       8         rows (u64 LE)
//! 16      8         columns (u64 LE)
//! 24      8·r·c     row-major f64 LE payload
//! ```

use crate::error::{Result, SweepError};
use crate::generation::Generation;
use crate::io_util::atomic_write_bytes;
use crate::problem::ProblemDefinition;
use crate::sampling::{SampleMatrix, StrategyConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const MAGIC: &[u8; 8] = b"SWPMTX01";
const HEADER_LEN: usize = 24;

// ============================================================================
// Matrix encoding
// ============================================================================

/// Encode a matrix into the binary artifact layout
pub fn encode_matrix(matrix: &SampleMatrix) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 8 * matrix.len() * matrix.columns());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(matrix.len() as u64).to_le_bytes());
    out.extend_from_slice(&(matrix.columns() as u64).to_le_bytes());
    for value in matrix.rows().iter().flatten() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Decode the binary artifact layout
pub fn decode_matrix(bytes: &[u8]) -> Result<SampleMatrix> {
    if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
        return Err(SweepError::validation(
            "not a sample matrix artifact (bad magic or truncated header)",
        ));
    }
    let rows = usize::try_from(read_u64(bytes, 8))
        .map_err(|_| SweepError::validation("sample matrix row count does not fit in memory"))?;
    let columns = usize::try_from(read_u64(bytes, 16))
        .map_err(|_| SweepError::validation("sample matrix column count does not fit in memory"))?;
    if columns == 0 {
        return Err(SweepError::validation(
            "sample matrix has no columns; a problem needs at least one parameter",
        ));
    }
    let expected = rows
        .checked_mul(columns)
        .and_then(|n| n.checked_mul(8))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| SweepError::validation("sample matrix dimensions overflow"))?;
    if bytes.len() != expected {
        return Err(SweepError::validation(format!(
            "sample matrix payload is {} bytes, expected {} for {}x{}",
            bytes.len(),
            expected,
            rows,
            columns
        )));
    }

    let data: Vec<f64> = bytes[HEADER_LEN..]
        .chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            f64::from_le_bytes(buf)
        })
        .collect();

    let row_vectors = data.chunks_exact(columns).map(<[f64]>::to_vec).collect();
    SampleMatrix::from_rows(columns, row_vectors).map_err(|e| SweepError::validation(e.to_string()))
}

// ============================================================================
// Manifest
// ============================================================================

/// Description of a persisted sample matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleManifest {
    pub strategy: StrategyConfig,
    /// Effective seed, generated when the workflow file leaves it out
    pub seed: u64,
    /// Loop round the matrix belongs to; absent for sweeps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<Generation>,
    pub problem: ProblemDefinition,
    pub sample_count: usize,
    pub unique_count: usize,
    /// Seconds since the Unix epoch
    pub created_at: u64,
    pub elapsed_secs: f64,
}

impl SampleManifest {
    pub fn new(
        strategy: StrategyConfig,
        seed: u64,
        generation: Option<Generation>,
        problem: ProblemDefinition,
        sample_count: usize,
        unique_count: usize,
        elapsed_secs: f64,
    ) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            strategy,
            seed,
            generation,
            problem,
            sample_count,
            unique_count,
            created_at,
            elapsed_secs,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Matrix + manifest pair on disk
#[derive(Debug, Clone)]
pub struct SampleStore {
    matrix_path: PathBuf,
    manifest_path: PathBuf,
}

impl SampleStore {
    pub fn new(matrix_path: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            matrix_path: matrix_path.into(),
            manifest_path: manifest_path.into(),
        }
    }

    /// Store whose files live in `dir` under the given names
    pub fn in_dir(dir: &Path, matrix_name: &str, manifest_name: &str) -> Self {
        Self::new(dir.join(matrix_name), dir.join(manifest_name))
    }

    pub fn matrix_path(&self) -> &Path {
        &self.matrix_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn exists(&self) -> bool {
        self.matrix_path.exists() && self.manifest_path.exists()
    }

    /// Persist both artifacts. The matrix is written first so a manifest
    /// never describes a matrix that is not on disk.
    pub fn save(&self, matrix: &SampleMatrix, manifest: &SampleManifest) -> Result<()> {
        atomic_write_bytes(&self.matrix_path, &encode_matrix(matrix))?;
        let json = serde_json::to_string_pretty(manifest)?;
        atomic_write_bytes(&self.manifest_path, json.as_bytes())?;
        debug!(
            "Saved {}x{} sample matrix to {}",
            matrix.len(),
            matrix.columns(),
            self.matrix_path.display()
        );
        Ok(())
    }

    /// Load and cross-check both artifacts
    pub fn load(&self) -> Result<(SampleMatrix, SampleManifest)> {
        let bytes = fs::read(&self.matrix_path).map_err(|e| {
            SweepError::state(format!(
                "cannot read sample matrix {}: {}",
                self.matrix_path.display(),
                e
            ))
        })?;
        let matrix = decode_matrix(&bytes)?;

        let text = fs::read_to_string(&self.manifest_path).map_err(|e| {
            SweepError::state(format!(
                "cannot read sample manifest {}: {}",
                self.manifest_path.display(),
                e
            ))
        })?;
        let manifest: SampleManifest = serde_json::from_str(&text)?;

        if manifest.sample_count != matrix.len() {
            return Err(SweepError::analysis(format!(
                "manifest records {} samples but the matrix holds {}",
                manifest.sample_count,
                matrix.len()
            )));
        }
        if manifest.problem.len() != matrix.columns() {
            return Err(SweepError::analysis(format!(
                "manifest problem has {} parameters but the matrix has {} columns",
                manifest.problem.len(),
                matrix.columns()
            )));
        }

        Ok((matrix, manifest))
    }
}
