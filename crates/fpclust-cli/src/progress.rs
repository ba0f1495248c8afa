//! Terminal progress reporting.

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over `total` steps, hidden when `show` is false.
pub fn create_progress_bar(total: usize, show: bool) -> anyhow::Result<ProgressBar> {
    if !show {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
