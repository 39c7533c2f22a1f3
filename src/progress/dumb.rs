//! Dumb console progress reporting: one line per builder, no cursor tricks.

use crate::builder::BuilderId;
use crate::progress::Progress;

pub struct DumbConsoleProgress;

impl Progress for DumbConsoleProgress {
    fn prepare(&self, _config: &super::ProgressConfig) {}

    fn build_started(&self, _id: BuilderId, name: &str, status: &super::ProgressStatus) {
        println!("[{}/{}] {name}", status.started + 1, status.total);
    }

    fn build_finished(&self, _id: BuilderId, _success: bool, _status: &super::ProgressStatus) {}

    fn finish(&self) {}
}
