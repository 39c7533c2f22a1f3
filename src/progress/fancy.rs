//! Fancy console progress bar.

use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::BuilderId;
use crate::progress::Progress;

pub struct FancyConsoleProgress {
    progress: indicatif::ProgressBar,
}

impl FancyConsoleProgress {
    pub fn new() -> Self {
        Self {
            progress: ProgressBar::no_length().with_style(
                ProgressStyle::with_template("[{bar:30}] {pos}/{len}: {wide_msg}")
                    .expect("invalid progress style")
                    .progress_chars("=> "),
            ),
        }
    }

    fn update_progress(&self, status: &super::ProgressStatus) {
        self.progress.set_length(status.total as u64);
        self.progress.set_position((status.started + 1) as u64);
    }
}

impl Default for FancyConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for FancyConsoleProgress {
    fn prepare(&self, _config: &super::ProgressConfig) {}

    fn build_started(&self, _id: BuilderId, name: &str, status: &super::ProgressStatus) {
        self.update_progress(status);
        self.progress.set_message(name.to_string());
    }

    fn build_finished(&self, _id: BuilderId, _success: bool, status: &super::ProgressStatus) {
        self.update_progress(status);
    }

    fn finish(&self) {
        self.progress.finish_and_clear();
    }
}
