//! Continuation sentinel for the loop workflow.
//!
//! The external scheduler re-submits the next round only while the sentinel
//! file is non-empty. The signal is re-derived from scratch every round.

use crate::generation::Generation;
use crate::io_util::atomic_write;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Token written to the sentinel when another round should run
pub const CONTINUE_TOKEN: &str = "continue";

/// Binary continue/stop decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationSignal {
    Continue,
    Stop,
}

impl ContinuationSignal {
    /// Pure decision: continue iff `generation < max_generations`.
    pub fn decide(generation: Generation, max_generations: u32) -> Self {
        if generation.value() < max_generations {
            Self::Continue
        } else {
            Self::Stop
        }
    }

    /// Sentinel file content for this signal
    pub fn content(self) -> &'static str {
        match self {
            Self::Continue => CONTINUE_TOKEN,
            Self::Stop => "",
        }
    }

    /// Interpret sentinel content: empty means stop, anything else continues
    pub fn from_content(content: &str) -> Self {
        if content.trim().is_empty() {
            Self::Stop
        } else {
            Self::Continue
        }
    }

    pub fn is_continue(self) -> bool {
        self == Self::Continue
    }
}

impl fmt::Display for ContinuationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// Writes the sentinel artifact for a configured maximum number of rounds
#[derive(Debug, Clone)]
pub struct ContinuationDecider {
    signal_path: PathBuf,
    max_generations: u32,
}

impl ContinuationDecider {
    pub fn new(signal_path: impl Into<PathBuf>, max_generations: u32) -> Self {
        Self {
            signal_path: signal_path.into(),
            max_generations,
        }
    }

    pub fn signal_path(&self) -> &Path {
        &self.signal_path
    }

    pub fn max_generations(&self) -> u32 {
        self.max_generations
    }

    /// Rewrite the sentinel for `generation`.
    ///
    /// The file is first reset to the stop state, then replaced with the
    /// continue token only if another round is due, so a stale "continue"
    /// from a previous round can never survive.
    pub fn decide(&self, generation: Generation) -> io::Result<ContinuationSignal> {
        let signal = ContinuationSignal::decide(generation, self.max_generations);

        atomic_write(&self.signal_path, ContinuationSignal::Stop.content())?;
        if signal.is_continue() {
            atomic_write(&self.signal_path, signal.content())?;
            info!(
                "Generation {} is below max {}; continuing",
                generation, self.max_generations
            );
        } else {
            info!(
                "Reached generation {} of {}; stopping",
                generation, self.max_generations
            );
        }

        Ok(signal)
    }

    /// Read the current sentinel state (a missing file reads as stop)
    pub fn current(&self) -> io::Result<ContinuationSignal> {
        match fs::read_to_string(&self.signal_path) {
            Ok(content) => Ok(ContinuationSignal::from_content(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ContinuationSignal::Stop),
            Err(e) => Err(e),
        }
    }
}
