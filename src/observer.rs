//! Task Progress Observer
//!
//! Follows one or more server tasks until each reaches a terminal state, then
//! reports the aggregate outcome exactly once.
//!
//! Architecture:
//! ```text
//!   reader (channel 0) ──┐
//!   reader (channel 1) ──┼── mpsc ──► coordinator ──► ProgressSink
//!   reader (channel n) ──┘            (owns every task state machine)
//! ```
//!
//! Each reader owns one connection. The coordinator is the only writer of
//! task state, closes a connection as soon as all of its tasks are terminal,
//! and enforces the observation timeout. Dropping or cancelling the returned
//! [`Observation`] aborts the coordinator and every reader, which closes all
//! connections without firing further callbacks.

use crate::error::{ConsoleError, Result};
use crate::event::{decode_frame, Frame, ProgressEvent};
use crate::task::{Outcome, TaskId, TaskOutcome, TaskTracker};
use crate::transport::ProgressSource;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const SIGNAL_BUFFER: usize = 64;

/// Receives progress of an observation
pub trait ProgressSink: Send + 'static {
    /// One inbound event, in delivery order. `task` is `None` for an
    /// unattributed frame on a multiplexed channel.
    fn on_event(&mut self, task: Option<&TaskId>, event: &ProgressEvent);

    /// Fired exactly once, after every task reached a terminal state
    fn on_terminal(&mut self, outcome: &Outcome);
}

/// Closure pair adapter for [`ProgressSink`]
pub struct CallbackSink<E, T> {
    on_event: E,
    on_terminal: T,
}

pub fn callbacks<E, T>(on_event: E, on_terminal: T) -> CallbackSink<E, T>
where
    E: FnMut(Option<&TaskId>, &ProgressEvent) + Send + 'static,
    T: FnMut(&Outcome) + Send + 'static,
{
    CallbackSink {
        on_event,
        on_terminal,
    }
}

impl<E, T> ProgressSink for CallbackSink<E, T>
where
    E: FnMut(Option<&TaskId>, &ProgressEvent) + Send + 'static,
    T: FnMut(&Outcome) + Send + 'static,
{
    fn on_event(&mut self, task: Option<&TaskId>, event: &ProgressEvent) {
        (self.on_event)(task, event)
    }

    fn on_terminal(&mut self, outcome: &Outcome) {
        (self.on_terminal)(outcome)
    }
}

/// One connection and the tasks whose progress it carries
pub struct Channel {
    tasks: Vec<TaskId>,
    source: Box<dyn ProgressSource>,
}

impl Channel {
    /// Dedicated connection for a single task
    pub fn new(task: TaskId, source: impl ProgressSource + 'static) -> Self {
        Self {
            tasks: vec![task],
            source: Box::new(source),
        }
    }

    /// One connection carrying several tasks
    pub fn multiplexed(tasks: Vec<TaskId>, source: impl ProgressSource + 'static) -> Self {
        Self {
            tasks,
            source: Box::new(source),
        }
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }
}

#[derive(Debug, Clone, Default)]
pub struct Observer {
    timeout: Option<Duration>,
}

impl Observer {
    /// `timeout` bounds the whole observation; `None` waits forever
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Start observing. Must be called inside a tokio runtime.
    pub fn observe<S: ProgressSink>(&self, channels: Vec<Channel>, sink: S) -> Result<Observation> {
        if channels.is_empty() {
            return Err(ConsoleError::Validation("no tasks to observe".to_string()));
        }
        let mut seen = HashSet::new();
        for channel in &channels {
            if channel.tasks.is_empty() {
                return Err(ConsoleError::Validation(format!(
                    "channel {} carries no task",
                    channel.source.describe()
                )));
            }
            for task in &channel.tasks {
                if !seen.insert(task.clone()) {
                    return Err(ConsoleError::Validation(format!(
                        "task {} observed twice",
                        task
                    )));
                }
            }
        }

        let id = Uuid::new_v4();
        let mut tracker = TaskTracker::new(channels.iter().flat_map(|c| c.tasks.iter().cloned()));
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let mut readers = Readers::default();
        let mut routes = Vec::with_capacity(channels.len());

        for (index, channel) in channels.into_iter().enumerate() {
            info!(
                observation = %id,
                source = %channel.source.describe(),
                tasks = ?channel.tasks,
                "Observing task progress"
            );
            for task in &channel.tasks {
                if let Some(progress) = tracker.get_mut(task) {
                    progress.connecting();
                }
            }
            routes.push(channel.tasks);
            readers.push(tokio::spawn(read_channel(index, channel.source, tx.clone())));
        }
        drop(tx);

        let cancelled = Arc::new(AtomicBool::new(false));
        let coordinator = Coordinator {
            id,
            tracker,
            routes,
            readers,
            sink,
            cancelled: cancelled.clone(),
            timeout: self.timeout,
        };
        let handle = tokio::spawn(coordinator.run(rx));

        Ok(Observation {
            id,
            handle: Some(handle),
            cancelled,
        })
    }
}

/// Scoped handle on a running observation.
///
/// Dropping it tears the observation down: connections close and no further
/// callbacks fire.
pub struct Observation {
    id: Uuid,
    handle: Option<JoinHandle<Outcome>>,
    cancelled: Arc<AtomicBool>,
}

impl Observation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Wait for the aggregate outcome. Dropping this future does not cancel
    /// the observation; dropping the handle does.
    pub async fn wait(&mut self) -> Result<Outcome> {
        let handle = self.handle.as_mut().ok_or(ConsoleError::Cancelled)?;
        let result = handle.await;
        self.handle = None;
        result.map_err(|e| {
            if e.is_panic() {
                error!(observation = %self.id, "Observer task panicked: {}", e);
            }
            ConsoleError::Cancelled
        })
    }

    /// Tear down every connection and wait until teardown completed
    pub async fn cancel(mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
            info!(observation = %self.id, "Observation cancelled");
        }
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancelled.store(true, Ordering::SeqCst);
            handle.abort();
        }
    }
}

enum Signal {
    Connected { channel: usize },
    Frame { channel: usize, frame: Frame },
    Failed { channel: usize, error: ConsoleError },
    Closed { channel: usize },
}

/// Reader tasks, aborted when dropped
#[derive(Default)]
struct Readers(Vec<JoinHandle<()>>);

impl Readers {
    fn push(&mut self, handle: JoinHandle<()>) {
        self.0.push(handle);
    }

    fn abort(&self, index: usize) {
        if let Some(handle) = self.0.get(index) {
            handle.abort();
        }
    }

    fn abort_all(&self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

impl Drop for Readers {
    fn drop(&mut self) {
        self.abort_all();
    }
}

async fn read_channel(index: usize, source: Box<dyn ProgressSource>, tx: mpsc::Sender<Signal>) {
    let mut frames = match source.open().await {
        Ok(frames) => frames,
        Err(error) => {
            let _ = tx.send(Signal::Failed { channel: index, error }).await;
            return;
        }
    };
    if tx.send(Signal::Connected { channel: index }).await.is_err() {
        return;
    }

    while let Some(item) = frames.next().await {
        let signal = match item {
            Ok(text) => Signal::Frame {
                channel: index,
                frame: decode_frame(&text),
            },
            Err(error) => {
                let _ = tx.send(Signal::Failed { channel: index, error }).await;
                return;
            }
        };
        if tx.send(signal).await.is_err() {
            return;
        }
    }

    let _ = tx.send(Signal::Closed { channel: index }).await;
}

struct Coordinator<S> {
    id: Uuid,
    tracker: TaskTracker,
    /// Tasks carried by each channel, indexed like `readers`
    routes: Vec<Vec<TaskId>>,
    readers: Readers,
    sink: S,
    cancelled: Arc<AtomicBool>,
    timeout: Option<Duration>,
}

impl<S: ProgressSink> Coordinator<S> {
    async fn run(mut self, mut rx: mpsc::Receiver<Signal>) -> Outcome {
        let deadline = self.timeout.map(|t| Instant::now() + t);

        while !self.tracker.all_terminal() {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, rx.recv()).await {
                    Ok(signal) => signal,
                    Err(_) => {
                        self.expire();
                        break;
                    }
                },
                None => rx.recv().await,
            };

            match next {
                Some(signal) => self.handle(signal),
                None => break,
            }
        }

        self.readers.abort_all();
        for task in self.tracker.pending() {
            self.tracker.finish(&task, TaskOutcome::Ended);
        }
        let outcome = self
            .tracker
            .outcome()
            .unwrap_or(Outcome { tasks: Vec::new() });

        if outcome.is_success() {
            info!(observation = %self.id, tasks = outcome.tasks.len(), "Observation succeeded");
        } else {
            warn!(
                observation = %self.id,
                failed = outcome.failures().count(),
                "Observation failed"
            );
        }

        if !self.is_cancelled() {
            self.sink.on_terminal(&outcome);
        }
        outcome
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn handle(&mut self, signal: Signal) {
        let channel = match signal {
            Signal::Connected { channel } => {
                debug!(observation = %self.id, channel, "Channel connected");
                for task in &self.routes[channel] {
                    if let Some(progress) = self.tracker.get_mut(task) {
                        progress.streaming();
                    }
                }
                channel
            }
            Signal::Frame { channel, frame } => {
                self.deliver(channel, frame);
                channel
            }
            Signal::Failed { channel, error } => {
                warn!(observation = %self.id, channel, "Progress stream failed: {}", error);
                self.finish_channel(channel, TaskOutcome::Failed(error));
                channel
            }
            Signal::Closed { channel } => {
                debug!(observation = %self.id, channel, "Progress stream closed");
                self.finish_channel(channel, TaskOutcome::Ended);
                channel
            }
        };

        if self.routes[channel]
            .iter()
            .all(|task| self.tracker.is_terminal(task))
        {
            self.readers.abort(channel);
        }
    }

    fn deliver(&mut self, channel: usize, frame: Frame) {
        let route = self.routes[channel].clone();
        let targets: Vec<TaskId> = match &frame.task {
            Some(task) if route.contains(task) => vec![task.clone()],
            Some(task) if route.len() == 1 => {
                debug!(
                    observation = %self.id,
                    frame_task = %task,
                    task = %route[0],
                    "Attributing frame to channel task"
                );
                route.clone()
            }
            Some(task) => {
                warn!(
                    observation = %self.id,
                    task = %task,
                    "Dropping frame for a task not on this channel"
                );
                return;
            }
            None => route.clone(),
        };

        let live: Vec<TaskId> = targets
            .into_iter()
            .filter(|task| {
                self.tracker
                    .get_mut(task)
                    .map(|progress| progress.record_event())
                    .unwrap_or(false)
            })
            .collect();
        if live.is_empty() {
            return;
        }

        if !self.is_cancelled() {
            let attributed = if route.len() == 1 || frame.task.is_some() {
                live.first()
            } else {
                None
            };
            self.sink.on_event(attributed, &frame.event);
        }

        let outcome = match &frame.event {
            ProgressEvent::Done => TaskOutcome::Succeeded,
            ProgressEvent::Error { message } => {
                TaskOutcome::Failed(ConsoleError::Application(message.clone()))
            }
            _ => return,
        };
        for task in &live {
            if self.tracker.finish(task, outcome.clone()) {
                info!(
                    observation = %self.id,
                    task = %task,
                    success = !outcome.is_failure(),
                    "Task finished"
                );
            }
        }
    }

    fn finish_channel(&mut self, channel: usize, outcome: TaskOutcome) {
        for task in &self.routes[channel] {
            self.tracker.finish(task, outcome.clone());
        }
    }

    fn expire(&mut self) {
        let timeout = self.timeout.unwrap_or_default();
        for task in self.tracker.pending() {
            warn!(
                observation = %self.id,
                task = %task,
                "Task progress timed out after {:?}",
                timeout
            );
            self.tracker
                .finish(&task, TaskOutcome::Failed(ConsoleError::Timeout(timeout)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FrameStream;
    use async_trait::async_trait;
    use futures::stream;
    use parking_lot::Mutex;

    type Feed = mpsc::UnboundedSender<Result<String>>;

    struct ScriptedSource {
        rx: Mutex<Option<mpsc::UnboundedReceiver<Result<String>>>>,
    }

    fn scripted() -> (Feed, ScriptedSource) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            ScriptedSource {
                rx: Mutex::new(Some(rx)),
            },
        )
    }

    #[async_trait]
    impl ProgressSource for ScriptedSource {
        async fn open(&self) -> Result<FrameStream> {
            let rx = self
                .rx
                .lock()
                .take()
                .ok_or_else(|| ConsoleError::Network("already opened".into()))?;
            Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed())
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    struct RefusingSource;

    #[async_trait]
    impl ProgressSource for RefusingSource {
        async fn open(&self) -> Result<FrameStream> {
            Err(ConsoleError::Network("connection refused".into()))
        }

        fn describe(&self) -> String {
            "refusing".to_string()
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<(Option<TaskId>, ProgressEvent)>>>,
        terminals: Arc<Mutex<Vec<Outcome>>>,
    }

    impl ProgressSink for Recorder {
        fn on_event(&mut self, task: Option<&TaskId>, event: &ProgressEvent) {
            self.events.lock().push((task.cloned(), event.clone()));
        }

        fn on_terminal(&mut self, outcome: &Outcome) {
            self.terminals.lock().push(outcome.clone());
        }
    }

    fn send(feed: &Feed, text: &str) {
        let _ = feed.send(Ok(text.to_string()));
    }

    async fn wait_for_events(recorder: &Recorder, count: usize) {
        for _ in 0..200 {
            if recorder.events.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} events", count);
    }

    #[tokio::test]
    async fn test_success_fires_terminal_exactly_once() {
        let (feed, source) = scripted();
        send(&feed, r#"{"message": "pulling image"}"#);
        send(&feed, r#"{"message": "starting"}"#);
        send(&feed, r#"{"done": true}"#);
        send(&feed, r#"{"message": "late"}"#);
        send(&feed, r#"{"error": "late failure"}"#);

        let recorder = Recorder::default();
        let mut observation = Observer::default()
            .observe(vec![Channel::new("abc123".into(), source)], recorder.clone())
            .unwrap();
        let outcome = observation.wait().await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.get(&"abc123".into()), Some(&TaskOutcome::Succeeded));
        assert_eq!(recorder.terminals.lock().len(), 1);

        let events = recorder.events.lock();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].1, ProgressEvent::Done);
        assert!(events.iter().all(|(t, _)| t.as_ref() == Some(&"abc123".into())));
    }

    #[tokio::test]
    async fn test_error_suppresses_later_success() {
        let (feed, source) = scripted();
        send(&feed, r#"{"error": "no resource"}"#);
        send(&feed, r#"{"done": true}"#);

        let recorder = Recorder::default();
        let mut observation = Observer::default()
            .observe(vec![Channel::new("xyz789".into(), source)], recorder.clone())
            .unwrap();
        let outcome = observation.wait().await.unwrap();

        assert!(!outcome.is_success());
        assert_eq!(
            outcome.first_error(),
            Some(&ConsoleError::Application("no resource".into()))
        );
        assert_eq!(recorder.events.lock().len(), 1);
        assert_eq!(recorder.terminals.lock().len(), 1);
        assert!(!recorder.terminals.lock()[0].is_success());
    }

    #[tokio::test]
    async fn test_connection_is_closed_after_terminal() {
        let (feed, source) = scripted();
        send(&feed, "done");

        let mut observation = Observer::default()
            .observe(vec![Channel::new("t".into(), source)], Recorder::default())
            .unwrap();
        observation.wait().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), feed.closed())
            .await
            .expect("connection should be closed after the terminal event");
    }

    #[tokio::test]
    async fn test_multi_task_requires_every_success() {
        let (feed_a, source_a) = scripted();
        let (feed_b, source_b) = scripted();
        send(&feed_a, r#"{"done": true}"#);
        send(&feed_b, r#"{"error": "node down"}"#);

        let recorder = Recorder::default();
        let mut observation = Observer::default()
            .observe(
                vec![
                    Channel::new("a".into(), source_a),
                    Channel::new("b".into(), source_b),
                ],
                recorder.clone(),
            )
            .unwrap();
        let outcome = observation.wait().await.unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.get(&"a".into()), Some(&TaskOutcome::Succeeded));
        assert!(outcome.get(&"b".into()).unwrap().is_failure());
        assert_eq!(recorder.terminals.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_waits_for_all_tasks() {
        let (feed_a, source_a) = scripted();
        let (feed_b, source_b) = scripted();
        send(&feed_a, "done");

        let recorder = Recorder::default();
        let mut observation = Observer::default()
            .observe(
                vec![
                    Channel::new("a".into(), source_a),
                    Channel::new("b".into(), source_b),
                ],
                recorder.clone(),
            )
            .unwrap();

        let early = tokio::time::timeout(Duration::from_millis(50), observation.wait()).await;
        assert!(early.is_err());
        assert!(recorder.terminals.lock().is_empty());

        send(&feed_b, "done");
        let outcome = observation.wait().await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(recorder.terminals.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_tears_down_without_side_effects() {
        let (feed, source) = scripted();
        send(&feed, r#"{"message": "pulling image"}"#);

        let recorder = Recorder::default();
        let observation = Observer::default()
            .observe(vec![Channel::new("t".into(), source)], recorder.clone())
            .unwrap();
        wait_for_events(&recorder, 1).await;

        observation.cancel().await;
        tokio::time::timeout(Duration::from_secs(1), feed.closed())
            .await
            .expect("cancel should close the connection");

        send(&feed, r#"{"message": "after cancel"}"#);
        send(&feed, "done");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(recorder.events.lock().len(), 1);
        assert!(recorder.terminals.lock().is_empty());
    }

    #[tokio::test]
    async fn test_drop_closes_connection() {
        let (feed, source) = scripted();
        let recorder = Recorder::default();
        let observation = Observer::default()
            .observe(vec![Channel::new("t".into(), source)], recorder.clone())
            .unwrap();
        send(&feed, r#"{"message": "x"}"#);
        wait_for_events(&recorder, 1).await;

        drop(observation);
        tokio::time::timeout(Duration::from_secs(1), feed.closed())
            .await
            .expect("dropping the observation should close the connection");
        assert!(recorder.terminals.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_and_closes() {
        let (feed, source) = scripted();
        let recorder = Recorder::default();
        let mut observation = Observer::new(Some(Duration::from_secs(5)))
            .observe(vec![Channel::new("slow".into(), source)], recorder.clone())
            .unwrap();

        let outcome = observation.wait().await.unwrap();
        assert_eq!(
            outcome.get(&"slow".into()),
            Some(&TaskOutcome::Failed(ConsoleError::Timeout(Duration::from_secs(5))))
        );
        assert_eq!(recorder.terminals.lock().len(), 1);
        tokio::time::timeout(Duration::from_secs(1), feed.closed())
            .await
            .expect("timed out connection should be closed");
    }

    #[tokio::test]
    async fn test_connection_failure_is_failure_terminal() {
        let recorder = Recorder::default();
        let mut observation = Observer::default()
            .observe(vec![Channel::new("t".into(), RefusingSource)], recorder.clone())
            .unwrap();
        let outcome = observation.wait().await.unwrap();
        assert!(matches!(
            outcome.first_error(),
            Some(ConsoleError::Network(_))
        ));
        assert!(recorder.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_is_failure_terminal() {
        let (feed, source) = scripted();
        send(&feed, r#"{"message": "a"}"#);
        let _ = feed.send(Err(ConsoleError::Network("reset".into())));

        let mut observation = Observer::default()
            .observe(vec![Channel::new("t".into(), source)], Recorder::default())
            .unwrap();
        let outcome = observation.wait().await.unwrap();
        assert_eq!(
            outcome.first_error(),
            Some(&ConsoleError::Network("reset".into()))
        );
    }

    #[tokio::test]
    async fn test_close_without_terminal_is_ended() {
        let (feed, source) = scripted();
        send(&feed, "Creating container...");
        drop(feed);

        let recorder = Recorder::default();
        let mut observation = Observer::default()
            .observe(vec![Channel::new("t".into(), source)], recorder.clone())
            .unwrap();
        let outcome = observation.wait().await.unwrap();
        assert_eq!(outcome.get(&"t".into()), Some(&TaskOutcome::Ended));
        assert!(outcome.is_success());
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_multiplexed_channel_routes_by_task() {
        let (feed, source) = scripted();
        send(&feed, r#"{"task": "a", "message": "from a"}"#);
        send(&feed, r#"{"message": "shared"}"#);
        send(&feed, "CELERY_TASK_DONE:a");
        send(&feed, r#"{"task": "b", "message": "from b"}"#);
        send(&feed, "CELERY_TASK_DONE:b");

        let recorder = Recorder::default();
        let mut observation = Observer::default()
            .observe(
                vec![Channel::multiplexed(vec!["a".into(), "b".into()], source)],
                recorder.clone(),
            )
            .unwrap();
        let outcome = observation.wait().await.unwrap();
        assert!(outcome.is_success());

        let events = recorder.events.lock();
        assert_eq!(events[0].0, Some("a".into()));
        assert_eq!(events[1], (None, ProgressEvent::message("shared")));
        assert_eq!(events[2], (Some("a".into()), ProgressEvent::Done));
        assert_eq!(events[3].0, Some("b".into()));
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_unattributed_error_fails_every_task_on_multiplexed_channel() {
        let (feed, source) = scripted();
        send(&feed, r#"{"error": "pod eru is full"}"#);

        let recorder = Recorder::default();
        let mut observation = Observer::default()
            .observe(
                vec![Channel::multiplexed(vec!["a".into(), "b".into()], source)],
                recorder.clone(),
            )
            .unwrap();
        let outcome = observation.wait().await.unwrap();

        let failed = TaskOutcome::Failed(ConsoleError::Application("pod eru is full".into()));
        assert_eq!(outcome.get(&"a".into()), Some(&failed));
        assert_eq!(outcome.get(&"b".into()), Some(&failed));
        assert_eq!(recorder.terminals.lock().len(), 1);
        assert_eq!(
            recorder.events.lock().as_slice(),
            [(None, ProgressEvent::error("pod eru is full"))]
        );
    }

    #[tokio::test]
    async fn test_unattributed_error_logs_one_line() {
        let (feed, source) = scripted();
        send(&feed, r#"{"error": "pod eru is full"}"#);

        let view = crate::view::LogView::default();
        let mut observation = Observer::default()
            .observe(
                vec![Channel::multiplexed(vec!["a".into(), "b".into()], source)],
                view.clone(),
            )
            .unwrap();
        observation.wait().await.unwrap();

        let lines = view.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "pod eru is full");
        assert!(lines[0].is_error);
        assert_eq!(
            view.transition(),
            Some(crate::view::ViewTransition::ShowError("pod eru is full".into()))
        );
    }

    #[tokio::test]
    async fn test_single_task_channel_adopts_foreign_task_id() {
        let (feed, source) = scripted();
        // server-side id differs from the one the client was given
        send(&feed, "CELERY_TASK_DONE:celery-42");

        let mut observation = Observer::default()
            .observe(vec![Channel::new("lb-7".into(), source)], Recorder::default())
            .unwrap();
        let outcome = observation.wait().await.unwrap();
        assert_eq!(outcome.get(&"lb-7".into()), Some(&TaskOutcome::Succeeded));
    }

    #[tokio::test]
    async fn test_callbacks_adapter() {
        let (feed, source) = scripted();
        send(&feed, r#"{"message": "one"}"#);
        send(&feed, "done");

        let lines = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(Mutex::new(None));
        let (l, f) = (lines.clone(), finished.clone());
        let sink = callbacks(
            move |_, event: &ProgressEvent| {
                if let Some(line) = event.log_line() {
                    l.lock().push(line);
                }
            },
            move |outcome: &Outcome| {
                *f.lock() = Some(outcome.is_success());
            },
        );

        let mut observation = Observer::default()
            .observe(vec![Channel::new("t".into(), source)], sink)
            .unwrap();
        observation.wait().await.unwrap();
        assert_eq!(*lines.lock(), vec!["one".to_string()]);
        assert_eq!(*finished.lock(), Some(true));
    }

    #[tokio::test]
    async fn test_rejects_empty_and_duplicate_tasks() {
        let err = Observer::default()
            .observe(Vec::new(), Recorder::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConsoleError::Validation(_)));

        let (_a, source_a) = scripted();
        let (_b, source_b) = scripted();
        let err = Observer::default()
            .observe(
                vec![
                    Channel::new("same".into(), source_a),
                    Channel::new("same".into(), source_b),
                ],
                Recorder::default(),
            )
            .err()
            .unwrap();
        assert!(matches!(err, ConsoleError::Validation(_)));
    }
}
