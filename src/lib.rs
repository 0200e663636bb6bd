//! Citadel Console
//!
//! Client-side presentation layer for the Citadel container platform.
//! Wires typed forms to the dashboard's HTTP endpoints and follows long-running
//! server tasks (deploy, build, load-balancer creation) over WebSocket or
//! chunked HTTP progress streams.
//!
//! ## Module Structure
//!
//! - `config`: Console configuration (file, env)
//! - `error`: Error taxonomy shared by every call
//! - `api`: Typed endpoints and the HTTP client
//! - `forms`: Form models with dashboard defaults and validation
//! - `event`: Canonical progress events and the legacy frame decoder
//! - `task`: Task ids, per-task state machine, aggregate outcome
//! - `transport`: WebSocket and chunked-HTTP progress sources
//! - `observer`: Task progress observer with timeout and teardown
//! - `view`: Log view-model driven by the observer

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod forms;
pub mod observer;
pub mod task;
pub mod transport;
pub mod view;

pub use api::{CheckKind, ConsoleClient, Endpoint, Host, Network, Pod};
pub use config::ConsoleConfig;
pub use error::{ConsoleError, Result};
pub use event::{decode_frame, Frame, ProgressEvent};
pub use forms::{ActionRequest, DeployForm, LoadBalanceForm};
pub use observer::{callbacks, Channel, Observation, Observer, ProgressSink};
pub use task::{Outcome, TaskId, TaskOutcome, TaskState};
pub use transport::{FrameStream, HttpStreamSource, ProgressSource, WebSocketSource};
pub use view::{LogLine, LogView, SuccessAction, ViewTransition};
