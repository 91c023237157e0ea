//! Generation State Store
//!
//! Persists the single integer that identifies which round of the loop
//! workflow has been prepared. It is the only state shared between the
//! `prepare` and `collect` invocations that bracket the scheduler barrier.
//!
//! # Round Flow
//!
//! ```text
//! state = g      prepare      state = g + 1      [scheduler runs gen g+1]
//!    ↑                                                  ↓
//!    └──────────── collect gen g+1, decide ─────────────┘
//! ```
//!
//! # Readers
//!
//! - **Bootstrap** (`read_or_default`): a missing or unparseable record means
//!   no round has run yet, so the generation is 0.
//! - **Resume** (`read_required`): the caller must know which round just ran.
//!   A missing, corrupted or zero record is fatal.
//!
//! A single controller process per workflow instance is assumed. Two
//! controllers sharing one state record is undefined behavior and is not
//! guarded against.

use crate::io_util::atomic_write;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Round identifier. 0 means no round has run yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Generation(u32);

impl Generation {
    /// The "nothing has run" generation
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// True when no round has been prepared yet
    #[inline]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }

    /// The generation that follows this one (exactly +1)
    pub fn next(self) -> Result<Self, GenerationError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or(GenerationError::Exhausted { last: self.0 })
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur when a caller requires a prior round to exist
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("State record {path} not found; cannot determine generation")]
    Missing { path: PathBuf },

    #[error("Invalid content {content:?} in {path}; cannot determine generation")]
    Corrupt { path: PathBuf, content: String },

    #[error("State record {path} indicates generation 0; nothing to collect")]
    NotStarted { path: PathBuf },

    #[error("Generation {last} is the last representable round; cannot advance")]
    Exhausted { last: u32 },

    #[error("Failed to access state record {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<GenerationError> for crate::error::SweepError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Io { source, .. } => crate::error::SweepError::Io(source),
            other => crate::error::SweepError::State(other.to_string()),
        }
    }
}

/// Parsed content of the state record, before a reader applies its policy
enum Stored {
    Absent,
    Invalid(String),
    Value(Generation),
}

/// File-backed store for the current generation
#[derive(Debug, Clone)]
pub struct GenerationStateStore {
    path: PathBuf,
}

impl GenerationStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Stored, GenerationError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let trimmed = content.trim();
                match trimmed.parse::<u32>() {
                    Ok(value) => Ok(Stored::Value(Generation(value))),
                    Err(_) => Ok(Stored::Invalid(trimmed.to_string())),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Stored::Absent),
            Err(source) => Err(GenerationError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Bootstrap read: a missing or invalid record yields generation 0.
    pub fn read_or_default(&self) -> Result<Generation, GenerationError> {
        match self.load()? {
            Stored::Value(g) => Ok(g),
            Stored::Absent => {
                debug!("No state record at {}; starting from generation 0", self.path.display());
                Ok(Generation::ZERO)
            }
            Stored::Invalid(content) => {
                warn!(
                    "Invalid content {:?} in {}; starting from generation 0",
                    content,
                    self.path.display()
                );
                Ok(Generation::ZERO)
            }
        }
    }

    /// Resume read: the record must exist, parse, and name a round > 0.
    pub fn read_required(&self) -> Result<Generation, GenerationError> {
        match self.load()? {
            Stored::Value(g) if g.is_initial() => Err(GenerationError::NotStarted {
                path: self.path.clone(),
            }),
            Stored::Value(g) => Ok(g),
            Stored::Absent => Err(GenerationError::Missing {
                path: self.path.clone(),
            }),
            Stored::Invalid(content) => Err(GenerationError::Corrupt {
                path: self.path.clone(),
                content,
            }),
        }
    }

    /// Overwrite the persisted generation. No partial write is observable.
    pub fn write(&self, generation: Generation) -> Result<(), GenerationError> {
        atomic_write(&self.path, &generation.to_string()).map_err(|source| GenerationError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!("State record {} set to generation {}", self.path.display(), generation);
        Ok(())
    }
}
