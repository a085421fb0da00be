//! Terminal feedback for the player CLI.
//!
//! Startup stages get a spinner on a TTY and a plain `==>` line otherwise.
//! Status lines always go to stderr so stdout stays free for scripting.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::pump::{PipelineState, PumpStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty | UiMode::Auto => true,
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    /// Pick pretty output when stderr is a terminal and `NO_COLOR` is unset.
    pub fn detect(mode: UiMode) -> Self {
        let is_tty = std::io::stderr().is_terminal();
        let mode = match mode {
            UiMode::Auto if std::env::var_os("NO_COLOR").is_some() => UiMode::Plain,
            other => other,
        };
        Self::new(mode, is_tty)
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    pub fn status(&self, state: &PipelineState, stats: &PumpStats) {
        eprintln!("{}", status_line(state, stats));
    }
}

/// One-line summary of where the pipeline is.
pub fn status_line(state: &PipelineState, stats: &PumpStats) -> String {
    format!(
        "state: {} | read {} | shown {} | dropped {} | detector errors {}",
        state,
        stats.frames_read,
        stats.frames_published,
        stats.frames_discarded,
        stats.detector_errors
    )
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    failed: Option<String>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            failed: None,
        }
    }

    /// Finish the stage as failed instead of done.
    pub fn fail(mut self, reason: impl Into<String>) {
        self.failed = Some(reason.into());
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = format_duration(self.start.elapsed());
        let message = match &self.failed {
            Some(reason) => format!("✘ {} ({}): {}", self.name, elapsed, reason),
            None => format!("✔ {} ({})", self.name, elapsed),
        };
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_or_pipe_disables_spinners() {
        assert!(!Ui::new(UiMode::Plain, true).is_pretty());
        assert!(!Ui::new(UiMode::Pretty, false).is_pretty());
        assert!(Ui::new(UiMode::Auto, true).is_pretty());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn status_line_reports_state_and_counters() {
        let stats = PumpStats {
            frames_read: 11,
            frames_published: 10,
            ..PumpStats::default()
        };
        let line = status_line(&PipelineState::Exhausted, &stats);
        assert_eq!(
            line,
            "state: exhausted | read 11 | shown 10 | dropped 0 | detector errors 0"
        );
    }
}
