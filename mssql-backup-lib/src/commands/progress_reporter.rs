use crate::backup::{ProgressSink, TableProgress, TableStage};
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;

/// Refresh rate for progress updates (10 Hz).
const REFRESH_INTERVAL_MS: u64 = 100;

const TEMPLATE: &str = "{prefix:>12.bold.cyan} [{bar:25}] {pos}/{len} {msg}";
const TEMPLATE_NO_COLOR: &str = "{prefix:>12} [{bar:25}] {pos}/{len} {msg}";

/// Tables finished and tables in total for one database.
#[derive(Debug, Default, Clone, Copy)]
struct RunCounts {
    finished: u64,
    total: u64,
}

/// Progress of every run sharing the bar; the bar shows their sum.
#[derive(Debug, Default)]
struct BarState {
    runs: HashMap<String, RunCounts>,
    message: String,
}

impl BarState {
    fn length(&self) -> u64 {
        self.runs.values().map(|r| r.total).sum()
    }

    fn position(&self) -> u64 {
        self.runs.values().map(|r| r.finished).sum()
    }
}

struct DelayedProgressState {
    visible_after: Instant,
    visible: AtomicBool,
    bar: Mutex<BarState>,
}

impl Debug for DelayedProgressState {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DelayedProgressState")
            .field("visible_after", &self.visible_after)
            .field("visible", &self.visible)
            .finish_non_exhaustive()
    }
}

/// A progress bar over the tables of a backup that delays showing itself until a threshold is reached.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    state: Arc<DelayedProgressState>,
    refresh_task: Arc<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Create a new progress reporter.
    ///
    /// The progress bar will only become visible if operations continue beyond the delay threshold.
    /// When `use_colors` is false, progress bar chrome is rendered without ANSI styling.
    #[must_use]
    pub fn new(delay: Duration, use_colors: bool) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_draw_target(ProgressDrawTarget::hidden());

        let template = if use_colors { TEMPLATE } else { TEMPLATE_NO_COLOR };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(style.progress_chars("=> "));
        }

        let state = Arc::new(DelayedProgressState {
            visible_after: Instant::now() + delay,
            visible: AtomicBool::new(false),
            bar: Mutex::new(BarState::default()),
        });

        Self {
            refresh_task: Arc::new(tokio::spawn(refresh_task(bar.clone(), Arc::clone(&state)))),
            bar,
            state,
        }
    }

    /// Set the prefix label for the progress bar (e.g., "Backing up").
    pub fn set_phase(&self, phase: &str) {
        self.bar.set_prefix(phase.to_string());
    }

    /// Print a message line without disrupting the progress indicator.
    pub fn println(&self, msg: &str) {
        self.bar.suspend(|| eprintln!("{msg}"));
    }

    /// Finish and clear the progress indicator.
    pub fn done(&self) {
        self.refresh_task.abort();
        if self.state.visible.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }
}

impl ProgressSink for ProgressReporter {
    fn table_progress(&self, event: &TableProgress<'_>) {
        let mut state = self.state.bar.lock().expect("lock poisoned");

        let finished = match event.stage {
            TableStage::Started => event.position.saturating_sub(1),
            TableStage::Archived { .. } | TableStage::Failed => event.position,
        };

        let _ = state.runs.insert(
            event.database.to_string(),
            RunCounts {
                finished: finished as u64,
                total: event.total as u64,
            },
        );
        state.message = format!("{}: {}", event.database, event.table);

        if event.stage == TableStage::Failed {
            drop(state);
            self.println(&format!("{}: {event}", event.database));
        }
    }
}

impl Debug for ProgressReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("bar", &self.bar)
            .field("state", &self.state)
            .field("refresh_task", &"<task>")
            .finish()
    }
}

/// Background refresh task that periodically updates the progress bar.
async fn refresh_task(bar: ProgressBar, state: Arc<DelayedProgressState>) {
    let mut interval = tokio::time::interval(Duration::from_millis(REFRESH_INTERVAL_MS));
    #[expect(clippy::infinite_loop, reason = "task runs until aborted")]
    loop {
        let _ = interval.tick().await;

        if !state.visible.load(Ordering::Relaxed) && Instant::now() >= state.visible_after {
            state.visible.store(true, Ordering::Relaxed);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        }

        if state.visible.load(Ordering::Relaxed) {
            let (length, position, message) = {
                let guard = state.bar.lock().expect("lock poisoned");
                (guard.length(), guard.position(), guard.message.clone())
            };

            if length > 0 {
                bar.set_length(length);
                bar.set_position(position);
            }
            bar.set_message(message);
        }
    }
}
