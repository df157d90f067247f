use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner} {msg:<10} [{bar:30}] {pos}/{len} ({elapsed})";

/// Per-phase progress bar. Hidden when disabled or stderr is not a terminal.
pub fn phase_bar(label: &str, total: usize, enabled: bool) -> ProgressBar {
    let bar = if enabled && console::user_attended_stderr() {
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        ProgressBar::new(total as u64).with_style(style)
    } else {
        ProgressBar::hidden()
    };
    bar.set_length(total as u64);
    bar.set_message(label.to_string());
    bar
}
