//! Task identity, per-task state machine and aggregate outcome
//!
//! A task moves `Idle → Connecting → Streaming` and ends in exactly one of
//! `Succeeded`, `Failed` or `Ended` (stream closed without a terminal event).
//! Terminal states are absorbing.

use crate::error::ConsoleError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-issued identifier of a long-running deploy/build operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Connecting,
    Streaming,
    Succeeded,
    Failed,
    /// Stream closed without a terminal event
    Ended,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Ended
        )
    }
}

/// How a single task finished
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(ConsoleError),
    Ended,
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_))
    }

    fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Succeeded => TaskState::Succeeded,
            TaskOutcome::Failed(_) => TaskState::Failed,
            TaskOutcome::Ended => TaskState::Ended,
        }
    }
}

/// Progress of one task
#[derive(Debug, Clone)]
pub struct TaskProgress {
    pub id: TaskId,
    pub state: TaskState,
    pub events_seen: usize,
    pub outcome: Option<TaskOutcome>,
}

impl TaskProgress {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::Idle,
            events_seen: 0,
            outcome: None,
        }
    }

    /// Idle → Connecting
    pub fn connecting(&mut self) -> bool {
        if self.state != TaskState::Idle {
            return false;
        }
        self.state = TaskState::Connecting;
        true
    }

    /// Idle/Connecting → Streaming
    pub fn streaming(&mut self) -> bool {
        match self.state {
            TaskState::Idle | TaskState::Connecting => {
                self.state = TaskState::Streaming;
                true
            }
            _ => false,
        }
    }

    /// Count an inbound event. Returns false once terminal, the event must then be dropped.
    pub fn record_event(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = TaskState::Streaming;
        self.events_seen += 1;
        true
    }

    /// Enter a terminal state. Only the first call has any effect.
    pub fn finish(&mut self, outcome: TaskOutcome) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = outcome.state();
        self.outcome = Some(outcome);
        true
    }
}

/// Outcome of a whole observation, one entry per task in observation order
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub tasks: Vec<(TaskId, TaskOutcome)>,
}

impl Outcome {
    /// AND over every task; an `Ended` task counts as not failed
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|(_, o)| !o.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&TaskId, &ConsoleError)> {
        self.tasks.iter().filter_map(|(id, o)| match o {
            TaskOutcome::Failed(e) => Some((id, e)),
            _ => None,
        })
    }

    pub fn first_error(&self) -> Option<&ConsoleError> {
        self.failures().next().map(|(_, e)| e)
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|(t, _)| t == id).map(|(_, o)| o)
    }
}

/// Tracks every task of one observation
#[derive(Debug, Clone, Default)]
pub struct TaskTracker {
    tasks: IndexMap<TaskId, TaskProgress>,
}

impl TaskTracker {
    pub fn new(ids: impl IntoIterator<Item = TaskId>) -> Self {
        let tasks = ids
            .into_iter()
            .map(|id| (id.clone(), TaskProgress::new(id)))
            .collect();
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskProgress> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut TaskProgress> {
        self.tasks.get_mut(id)
    }

    pub fn is_terminal(&self, id: &TaskId) -> bool {
        self.tasks
            .get(id)
            .map(|t| t.state.is_terminal())
            .unwrap_or(true)
    }

    pub fn finish(&mut self, id: &TaskId, outcome: TaskOutcome) -> bool {
        self.tasks
            .get_mut(id)
            .map(|t| t.finish(outcome))
            .unwrap_or(false)
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.state.is_terminal())
    }

    /// Tasks not yet in a terminal state
    pub fn pending(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| !t.state.is_terminal())
            .map(|t| t.id.clone())
            .collect()
    }

    /// Aggregate outcome, available once every task is terminal
    pub fn outcome(&self) -> Option<Outcome> {
        if !self.all_terminal() {
            return None;
        }
        let tasks = self
            .tasks
            .values()
            .map(|t| {
                (
                    t.id.clone(),
                    t.outcome.clone().unwrap_or(TaskOutcome::Ended),
                )
            })
            .collect();
        Some(Outcome { tasks })
    }
}
