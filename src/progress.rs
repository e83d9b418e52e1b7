//! Progress reporting for directory walks

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Receives progress updates while a directory is processed.
pub trait ProgressReporter {
    /// Called once, before the first file, with the number of eligible files.
    fn start(&mut self, total: usize);

    /// Called after each file completes. `current` is 1-based.
    fn advance(&mut self, current: usize, total: usize);

    /// Called when the walk ends, successfully or not.
    fn finish(&mut self) {}
}

/// Discards all updates.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&mut self, _total: usize) {}
    fn advance(&mut self, _current: usize, _total: usize) {}
}

/// Terminal progress bar on stderr.
pub struct BarProgress {
    prefix: String,
    bar: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            bar: None,
        }
    }
}

impl ProgressReporter for BarProgress {
    fn start(&mut self, total: usize) {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        // The template is a literal, so this only fails if it is edited badly.
        if let Ok(style) =
            ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_prefix(self.prefix.clone());
        self.bar = Some(bar);
    }

    fn advance(&mut self, current: usize, _total: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(current as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
