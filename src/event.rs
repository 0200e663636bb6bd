//! Progress events
//!
//! One canonical event schema, plus a decoder for every frame shape the
//! dashboard backend has been seen to emit on its progress streams:
//!
//! - bare `done` text and `CELERY_TASK_DONE:<task>` sentinels
//! - `{"error": "..."}` task failures (an empty `error` is not a failure)
//! - `{"type": "sentence", "message": "..."}` log lines
//! - image build messages (`stream`, `status`/`progress`, `error_detail`)
//! - container messages (`success`, `message`)
//! - raw text lines
//!
//! Anything else that is valid JSON is kept as [`ProgressEvent::Raw`] and
//! rendered verbatim.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel published by the backend when a task finishes
pub const TASK_DONE_PREFIX: &str = "CELERY_TASK_DONE:";

/// Canonical progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Informational line
    Message { text: String },
    /// Terminal failure
    Error { message: String },
    /// Terminal success
    Done,
    /// JSON payload of no known shape
    Raw { payload: Value },
}

impl ProgressEvent {
    pub fn message(text: impl Into<String>) -> Self {
        ProgressEvent::Message { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Error { .. } | ProgressEvent::Done)
    }

    /// Line to append to a log view; `Done` renders nothing
    pub fn log_line(&self) -> Option<String> {
        match self {
            ProgressEvent::Message { text } => Some(text.clone()),
            ProgressEvent::Error { message } => Some(message.clone()),
            ProgressEvent::Done => None,
            ProgressEvent::Raw { payload } => Some(payload.to_string()),
        }
    }
}

/// A decoded frame, optionally attributed to a task
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub task: Option<TaskId>,
    pub event: ProgressEvent,
}

impl Frame {
    pub fn new(task: Option<TaskId>, event: ProgressEvent) -> Self {
        Self { task, event }
    }
}

/// Decode one text frame from a progress stream
pub fn decode_frame(text: &str) -> Frame {
    let trimmed = text.trim();
    if let Some(frame) = decode_sentinel(trimmed) {
        return frame;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => decode_value(value),
        Err(_) => Frame::new(
            None,
            ProgressEvent::message(text.trim_end_matches(['\r', '\n'])),
        ),
    }
}

/// Decode an already-parsed JSON frame
pub fn decode_value(value: Value) -> Frame {
    match value {
        Value::Object(obj) => decode_object(obj),
        Value::String(s) => decode_sentinel(s.trim())
            .unwrap_or_else(|| Frame::new(None, ProgressEvent::Message { text: s })),
        other => Frame::new(None, ProgressEvent::Raw { payload: other }),
    }
}

fn decode_sentinel(text: &str) -> Option<Frame> {
    if text.eq_ignore_ascii_case("done") {
        return Some(Frame::new(None, ProgressEvent::Done));
    }
    text.strip_prefix(TASK_DONE_PREFIX).map(|id| {
        let id = id.trim();
        let task = (!id.is_empty()).then(|| TaskId::new(id));
        Frame::new(task, ProgressEvent::Done)
    })
}

fn decode_object(obj: Map<String, Value>) -> Frame {
    let task = obj.get("task").and_then(Value::as_str).map(TaskId::from);

    if let Some(event) = decode_canonical(&obj) {
        return Frame::new(task, event);
    }

    let event = match_legacy(&obj).unwrap_or_else(|| ProgressEvent::Raw {
        payload: Value::Object(obj),
    });
    Frame::new(task, event)
}

fn decode_canonical(obj: &Map<String, Value>) -> Option<ProgressEvent> {
    match obj.get("type").and_then(Value::as_str) {
        Some("message" | "error" | "done" | "raw") => {
            serde_json::from_value(Value::Object(obj.clone())).ok()
        }
        _ => None,
    }
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn match_legacy(obj: &Map<String, Value>) -> Option<ProgressEvent> {
    match obj.get("error") {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            return Some(ProgressEvent::error(s.clone()));
        }
        Some(Value::Null | Value::Bool(false) | Value::String(_)) | None => {}
        Some(other) => return Some(ProgressEvent::error(other.to_string())),
    }

    if let Some(msg) = obj
        .get("error_detail")
        .and_then(Value::as_object)
        .and_then(|d| non_empty_str(d, "message"))
    {
        return Some(ProgressEvent::error(msg));
    }

    if obj.get("done").and_then(Value::as_bool) == Some(true) {
        return Some(ProgressEvent::Done);
    }

    if obj.get("type").and_then(Value::as_str) == Some("sentence") {
        if let Some(msg) = obj.get("message").and_then(Value::as_str) {
            return Some(ProgressEvent::message(msg));
        }
    }

    if obj.get("success").and_then(Value::as_bool) == Some(false) {
        let msg = non_empty_str(obj, "message").unwrap_or("operation reported failure");
        return Some(ProgressEvent::error(msg));
    }

    if let Some(stream) = non_empty_str(obj, "stream") {
        return Some(ProgressEvent::message(stream.trim_end_matches(['\r', '\n'])));
    }

    if let Some(status) = non_empty_str(obj, "status") {
        return Some(match non_empty_str(obj, "progress") {
            Some(progress) => ProgressEvent::message(format!("{} {}", status, progress)),
            None => ProgressEvent::message(status),
        });
    }

    obj.get("message")
        .and_then(Value::as_str)
        .map(ProgressEvent::message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(text: &str) -> ProgressEvent {
        decode_frame(text).event
    }

    #[test]
    fn test_plain_message() {
        assert_eq!(
            event(r#"{"message": "pulling image"}"#),
            ProgressEvent::message("pulling image")
        );
    }

    #[test]
    fn test_done_object() {
        assert_eq!(event(r#"{"done": true}"#), ProgressEvent::Done);
        // done: false is not a terminal
        assert!(matches!(
            event(r#"{"done": false}"#),
            ProgressEvent::Raw { .. }
        ));
    }

    #[test]
    fn test_literal_done_sentinel() {
        assert_eq!(event("done"), ProgressEvent::Done);
        assert_eq!(event("  DONE\n"), ProgressEvent::Done);
        assert_eq!(event("\"done\""), ProgressEvent::Done);
    }

    #[test]
    fn test_task_done_sentinel_is_attributed() {
        let frame = decode_frame("CELERY_TASK_DONE:3f2a-11");
        assert_eq!(frame.event, ProgressEvent::Done);
        assert_eq!(frame.task, Some(TaskId::from("3f2a-11")));
    }

    #[test]
    fn test_error_payload() {
        assert_eq!(
            event(r#"{"error": "no resource"}"#),
            ProgressEvent::error("no resource")
        );
    }

    #[test]
    fn test_empty_error_is_not_a_failure() {
        let frame = event(
            r#"{"id": "9c91d0", "name": "test-app_web_kMqYFQ", "error": "", "success": true, "__class__": "CreateContainerMessage"}"#,
        );
        assert!(matches!(frame, ProgressEvent::Raw { .. }));
        assert!(!frame.is_terminal());
    }

    #[test]
    fn test_structured_error_is_a_failure() {
        let frame = event(r#"{"error": {"sha": ["too short"]}}"#);
        match frame {
            ProgressEvent::Error { message } => assert!(message.contains("too short")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_sentence_message() {
        assert_eq!(
            event(r#"{"type": "sentence", "message": "starting"}"#),
            ProgressEvent::message("starting")
        );
    }

    #[test]
    fn test_channel_field_is_ignored() {
        assert_eq!(
            event(r#"{"channel": "citadel:task:1:pubsub", "message": "hi"}"#),
            ProgressEvent::message("hi")
        );
    }

    #[test]
    fn test_build_stream_message() {
        assert_eq!(
            event(
                r#"{"id": "", "status": "", "progress": "", "error": "", "stream": "Step 1/7 : FROM python:latest\n", "error_detail": {"code": 0, "message": ""}}"#
            ),
            ProgressEvent::message("Step 1/7 : FROM python:latest")
        );
    }

    #[test]
    fn test_build_status_progress() {
        assert_eq!(
            event(
                r#"{"id": "0179a75e26fe", "status": "Pushing", "progress": "[=====>] 6.656kB", "error": "", "stream": ""}"#
            ),
            ProgressEvent::message("Pushing [=====>] 6.656kB")
        );
    }

    #[test]
    fn test_build_error_detail() {
        assert_eq!(
            event(
                r#"{"error": "", "stream": "", "error_detail": {"code": 1, "message": "pull access denied"}}"#
            ),
            ProgressEvent::error("pull access denied")
        );
    }

    #[test]
    fn test_remove_container_failure() {
        assert_eq!(
            event(r#"{"id": "abc", "success": false, "message": "No such container"}"#),
            ProgressEvent::error("No such container")
        );
        assert_eq!(
            event(r#"{"id": "abc", "success": false}"#),
            ProgressEvent::error("operation reported failure")
        );
    }

    #[test]
    fn test_raw_text_line() {
        assert_eq!(
            event("Creating container web-1...\n"),
            ProgressEvent::message("Creating container web-1...")
        );
    }

    #[test]
    fn test_unknown_json_kept_raw() {
        let frame = event(r#"{"podname": "eru", "cpu": {"0": 20}}"#);
        assert_eq!(
            frame,
            ProgressEvent::Raw {
                payload: json!({"podname": "eru", "cpu": {"0": 20}})
            }
        );
        let rendered: Value = serde_json::from_str(&frame.log_line().unwrap()).unwrap();
        assert_eq!(rendered, json!({"podname": "eru", "cpu": {"0": 20}}));
    }

    #[test]
    fn test_canonical_schema_roundtrips_through_decoder() {
        let text = serde_json::to_string(&ProgressEvent::error("disk full")).unwrap();
        assert_eq!(text, r#"{"type":"error","message":"disk full"}"#);
        assert_eq!(event(&text), ProgressEvent::error("disk full"));
        assert_eq!(event(r#"{"type": "done"}"#), ProgressEvent::Done);
    }

    #[test]
    fn test_task_field_attributes_frame() {
        let frame = decode_frame(r#"{"task": "t-2", "message": "pulling"}"#);
        assert_eq!(frame.task, Some(TaskId::from("t-2")));
        assert_eq!(frame.event, ProgressEvent::message("pulling"));
    }

    #[test]
    fn test_done_renders_no_log_line() {
        assert_eq!(ProgressEvent::Done.log_line(), None);
        assert_eq!(
            ProgressEvent::message("x").log_line().as_deref(),
            Some("x")
        );
    }
}
