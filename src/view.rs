//! Log view-model driven by an observation

use crate::error::ConsoleError;
use crate::event::ProgressEvent;
use crate::observer::ProgressSink;
use crate::task::{Outcome, TaskId};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;

static FRAGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").expect("valid fragment regex"));

/// Remove every `#word` fragment from a URL
pub fn strip_fragment(url: &str) -> String {
    FRAGMENT.replace_all(url, "").into_owned()
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub task: Option<TaskId>,
    pub text: String,
    pub is_error: bool,
    pub at: DateTime<Utc>,
}

/// What to do when every task succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessAction {
    Reload,
    StripFragment(String),
}

/// Terminal view transition, decided exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewTransition {
    Reload,
    /// Navigate to this URL (fragment removed)
    Navigate(String),
    /// Keep the view, show the error; navigation is suppressed
    ShowError(String),
}

#[derive(Debug)]
struct LogState {
    lines: Vec<LogLine>,
    has_error: bool,
    transition: Option<ViewTransition>,
    on_success: SuccessAction,
}

/// Shared log view. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct LogView {
    state: Arc<Mutex<LogState>>,
}

impl Default for LogView {
    fn default() -> Self {
        Self::new(SuccessAction::Reload)
    }
}

impl LogView {
    pub fn new(on_success: SuccessAction) -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState {
                lines: Vec::new(),
                has_error: false,
                transition: None,
                on_success,
            })),
        }
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.state.lock().lines.clone()
    }

    /// Lines from `from` on, for incremental rendering
    pub fn lines_since(&self, from: usize) -> Vec<LogLine> {
        self.state
            .lock()
            .lines
            .get(from..)
            .map(<[LogLine]>::to_vec)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log text, one line per entry
    pub fn text(&self) -> String {
        self.state
            .lock()
            .lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_error(&self) -> bool {
        self.state.lock().has_error
    }

    pub fn transition(&self) -> Option<ViewTransition> {
        self.state.lock().transition.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().transition.is_some()
    }

    fn push(state: &mut LogState, task: Option<&TaskId>, text: String, is_error: bool) {
        if is_error {
            state.has_error = true;
        }
        state.lines.push(LogLine {
            task: task.cloned(),
            text,
            is_error,
            at: Utc::now(),
        });
    }
}

impl ProgressSink for LogView {
    fn on_event(&mut self, task: Option<&TaskId>, event: &ProgressEvent) {
        let mut state = self.state.lock();
        if state.transition.is_some() {
            return;
        }
        if let Some(text) = event.log_line() {
            let is_error = matches!(event, ProgressEvent::Error { .. });
            Self::push(&mut state, task, text, is_error);
        }
    }

    fn on_terminal(&mut self, outcome: &Outcome) {
        let mut state = self.state.lock();
        if state.transition.is_some() {
            return;
        }

        // stream-reported errors are already in the log
        for (task, error) in outcome.failures() {
            if !matches!(error, ConsoleError::Application(_)) {
                Self::push(&mut state, Some(task), error.user_message(), true);
            }
        }

        let transition = match outcome.first_error() {
            Some(error) => ViewTransition::ShowError(error.user_message()),
            None => match &state.on_success {
                SuccessAction::Reload => ViewTransition::Reload,
                SuccessAction::StripFragment(url) => ViewTransition::Navigate(strip_fragment(url)),
            },
        };
        state.transition = Some(transition);
    }
}
