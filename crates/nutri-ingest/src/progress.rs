//! Terminal progress for long-running stages

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner that counts rows for one stage
///
/// Hidden when `visible` is false, so callers can tick it unconditionally.
pub fn stage_spinner(stage: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {prefix:<14} {pos} rows ({per_sec}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_prefix(stage.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
