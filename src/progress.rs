//! Progress reporting.
//!
//! Same shape as the teacher's own `progress` module, generalized from
//! reporting on a `BuildId` (one command) to a `BuilderId` (one registered
//! builder, possibly producing several nodes). There is no `stdout_line`
//! callback here: builders are Rust values invoked in-process, not
//! subprocesses with a stream to forward, so that hook has nothing left to
//! carry.

#[cfg(feature = "progress-dumb")]
pub mod dumb;
#[cfg(feature = "progress-fancy")]
pub mod fancy;
pub mod noop;

pub use noop::{NOOP_PROGRESS, NoopProgress};

#[cfg(feature = "progress-dumb")]
pub use dumb::DumbConsoleProgress;

#[cfg(feature = "progress-fancy")]
pub use fancy::FancyConsoleProgress;

use crate::builder::BuilderId;

/// Reports build progress. Methods may be called from multiple worker
/// threads, so implementations must be thread-safe.
pub trait Progress: Send + Sync {
    /// Called once before any builder starts.
    fn prepare(&self, config: &ProgressConfig);

    /// Callback when a builder starts running. `name` is the builder's
    /// [`crate::builder::Builder::display`] name.
    fn build_started(&self, id: BuilderId, name: &str, status: &ProgressStatus);

    /// Callback when a builder finishes, successfully or not.
    fn build_finished(&self, id: BuilderId, success: bool, status: &ProgressStatus);

    /// Called once after every builder has finished (or been skipped).
    fn finish(&self);
}

/// A config for the progress reporter.
#[derive(Clone, Debug)]
pub struct ProgressConfig {
    /// The maximum number of builders that might run concurrently, if known.
    pub max_threads: Option<usize>,
}

/// Status of the current progress.
#[derive(Clone, Debug)]
pub struct ProgressStatus {
    pub total: usize,
    /// Builders that have started, including ones that have since finished.
    pub started: usize,
    /// Builders that have finished, successfully, unsuccessfully, or skipped.
    pub done: usize,
    /// Builders that failed outright, not counting ones skipped as a
    /// consequence.
    pub failed: usize,
}
