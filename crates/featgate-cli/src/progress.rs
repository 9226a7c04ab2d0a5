use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner on stderr, hidden when progress output is disabled
pub fn spinner(enabled: bool, message: &str) -> ProgressBar {
    let pb = if enabled {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    } else {
        ProgressBar::hidden()
    };
    pb.set_message(message.to_string());
    pb
}
