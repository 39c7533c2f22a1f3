//! No-op progress reporter.

use crate::builder::BuilderId;

use super::{Progress, ProgressConfig, ProgressStatus};

/// Useful for tests or embedders that don't want console output.
pub struct NoopProgress;

impl Progress for NoopProgress {
    fn prepare(&self, _config: &ProgressConfig) {}

    fn build_started(&self, _id: BuilderId, _name: &str, _status: &ProgressStatus) {}

    fn build_finished(&self, _id: BuilderId, _success: bool, _status: &ProgressStatus) {}

    fn finish(&self) {}
}

/// A global no-op progress instance for convenience.
pub static NOOP_PROGRESS: NoopProgress = NoopProgress;
