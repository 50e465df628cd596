use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

use crate::stage::{StageName, StageStatus};

/// Terminal UI for a running pipeline session, rendered via `indicatif`
/// progress bars.
///
/// One bar per pipeline stage, stacked in execution order and driven by the
/// session event stream. All output is coordinated through `MultiProgress`
/// so log lines never tear the bars.
pub struct PipelineUi {
    multi: MultiProgress,
    bars: BTreeMap<StageName, ProgressBar>,
}

impl Default for PipelineUi {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineUi {
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let bar_style = ProgressStyle::default_bar()
            .template("{prefix:>20.bold.dim} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let mut bars = BTreeMap::new();
        for stage in StageName::ALL {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(bar_style.clone());
            bar.set_prefix(stage.wire_name());
            bar.set_message(status_label(StageStatus::Pending));
            bars.insert(stage, bar);
        }

        Self { multi, bars }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the
    /// rich UI fails. Prevents silent loss of user-facing messages when the
    /// terminal is unavailable.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Move one stage bar to the given percent and status.
    pub fn update(&self, stage: StageName, percent: f32, status: StageStatus) {
        if let Some(bar) = self.bars.get(&stage) {
            bar.set_position(percent.round() as u64);
            bar.set_message(status_label(status));
        }
    }

    /// Freeze every bar in place once the session is terminal.
    pub fn finish(&self) {
        for bar in self.bars.values() {
            bar.finish();
        }
    }
}

fn status_label(status: StageStatus) -> String {
    match status {
        StageStatus::Pending => style("pending").dim().to_string(),
        StageStatus::InProgress => style("in progress").yellow().to_string(),
        StageStatus::Completed => style("✓ complete").green().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_creates_one_bar_per_stage() {
        let ui = PipelineUi::new();
        assert_eq!(ui.bars.len(), StageName::ALL.len());
    }

    #[test]
    fn update_moves_the_bar_position() {
        let ui = PipelineUi::new();
        ui.update(StageName::Cleaning, 42.4, StageStatus::InProgress);
        assert_eq!(ui.bars[&StageName::Cleaning].position(), 42);
        ui.update(StageName::Cleaning, 100.0, StageStatus::Completed);
        assert_eq!(ui.bars[&StageName::Cleaning].position(), 100);
    }

    #[test]
    fn finishing_twice_is_harmless() {
        let ui = PipelineUi::new();
        ui.finish();
        ui.finish();
    }
}
