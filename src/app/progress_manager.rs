//! Per-item progress bars.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use mediaq_core::{ItemId, ItemState, Progress, QueueItem};

/// Bar length; fractions are rendered in tenths of a percent.
const BAR_SCALE: u64 = 1000;

/// One bar per queue item, drawn to stderr.
pub(crate) struct ProgressBoard {
    multi: MultiProgress,
    bars: HashMap<ItemId, ProgressBar>,
}

impl ProgressBoard {
    /// When `enabled` is false nothing is drawn but state is still tracked.
    pub(crate) fn new(enabled: bool) -> Self {
        let target = if enabled {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
        }
    }

    /// Brings the item's bar in line with its state.
    pub(crate) fn sync(&mut self, item: &QueueItem) {
        let multi = &self.multi;
        let bar = self
            .bars
            .entry(item.id())
            .or_insert_with(|| multi.add(ProgressBar::new(BAR_SCALE)));

        bar.set_prefix(item_label(item));
        match item.progress() {
            Progress::Indeterminate => {
                bar.set_style(spinner_style());
                bar.enable_steady_tick(Duration::from_millis(100));
            }
            Progress::Fraction(fraction) => {
                bar.disable_steady_tick();
                bar.set_style(bar_style());
                bar.set_position(bar_position(fraction));
            }
        }
        bar.set_message(item.status_message().to_string());

        match item.state() {
            ItemState::DownloadDone => bar.finish(),
            ItemState::MetadataFailed | ItemState::DownloadFailed => bar.abandon(),
            _ => {}
        }
    }

    pub(crate) fn clear(&self) {
        let _ = self.multi.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.bars.len()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {prefix:30!} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:30!} [{bar:30}] {percent:>3}% {wide_msg}")
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn item_label(item: &QueueItem) -> String {
    item.title().unwrap_or(item.url()).to_string()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn bar_position(fraction: f64) -> u64 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * BAR_SCALE as f64).round() as u64
}
