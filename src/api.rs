//! Dashboard API client
//!
//! [`Endpoint`] is the typed request builder for every dashboard route the
//! console uses. [`ConsoleClient`] sends one-shot requests and builds the
//! observer channels that follow the tasks those requests start.

use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, Result};
use crate::forms::{ActionRequest, DeployForm, LoadBalanceForm};
use crate::observer::{Channel, Observer};
use crate::task::TaskId;
use crate::transport::{HttpStreamSource, WebSocketSource};
use reqwest::cookie::Jar;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Flask session cookie name
const SESSION_COOKIE: &str = "session";

/// Kind of `check-*` progress socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    LoadBalance,
    Container,
    Build,
    Other(String),
}

impl CheckKind {
    pub fn as_str(&self) -> &str {
        match self {
            CheckKind::LoadBalance => "load-balance",
            CheckKind::Container => "container",
            CheckKind::Build => "build",
            CheckKind::Other(kind) => kind,
        }
    }
}

impl std::str::FromStr for CheckKind {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.trim().trim_start_matches("check-") {
            "load-balance" | "loadbalance" | "lb" => CheckKind::LoadBalance,
            "container" => CheckKind::Container,
            "build" => CheckKind::Build,
            "" => {
                return Err(ConsoleError::Validation(
                    "check kind must not be empty".to_string(),
                ))
            }
            other => CheckKind::Other(other.to_string()),
        };
        Ok(kind)
    }
}

/// Dashboard routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Pods,
    PodHosts { pod: String },
    PodNodes { pod: String },
    PodNetworks { pod: String },
    ReleaseEntrypoints { release: String },
    ImageEntrypoints { image: String },
    AddLoadBalance,
    DeployRelease { release: String },
    CreateContainer { app: String, sha: String },
    BuildImage { app: String, sha: String },
    /// PUT enables, DELETE disables
    Analysis { record: String, enable: bool },
    RemoveLoadBalance { id: String },
    DeleteRule { elbname: String },
    RemoveRoute { id: String },
    DeleteEnv { app: String },
    SwitchZone,
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::Pods
            | Endpoint::PodHosts { .. }
            | Endpoint::PodNodes { .. }
            | Endpoint::PodNetworks { .. }
            | Endpoint::ReleaseEntrypoints { .. }
            | Endpoint::ImageEntrypoints { .. } => Method::GET,
            Endpoint::Analysis { enable: true, .. } => Method::PUT,
            Endpoint::Analysis { enable: false, .. } => Method::DELETE,
            _ => Method::POST,
        }
    }

    fn segments(&self) -> Vec<&str> {
        match self {
            Endpoint::Pods => vec!["ajax", "pods"],
            Endpoint::PodHosts { pod } => vec!["ajax", "pod", pod.as_str(), "hosts"],
            Endpoint::PodNodes { pod } => vec!["ajax", "pod", pod.as_str(), "nodes"],
            Endpoint::PodNetworks { pod } => vec!["api", "v1", "pod", pod.as_str(), "networks"],
            Endpoint::ReleaseEntrypoints { release } => {
                vec!["ajax", "release", release.as_str(), "entrypoints"]
            }
            Endpoint::ImageEntrypoints { .. } => {
                vec!["ajax", "loadbalance", "get-image-entrypoints"]
            }
            Endpoint::AddLoadBalance => vec!["ajax", "loadbalance"],
            Endpoint::DeployRelease { release } => {
                vec!["ajax", "release", release.as_str(), "deploy"]
            }
            Endpoint::CreateContainer { app, sha } => {
                vec!["ajax", "app", app.as_str(), "version", sha.as_str(), "container"]
            }
            Endpoint::BuildImage { app, sha } => {
                vec!["ajax", "app", app.as_str(), "version", sha.as_str(), "build"]
            }
            Endpoint::Analysis { record, .. } => {
                vec!["ajax", "loadbalance", "record", record.as_str(), "analysis"]
            }
            Endpoint::RemoveLoadBalance { id } => {
                vec!["ajax", "loadbalance", id.as_str(), "remove"]
            }
            Endpoint::DeleteRule { elbname } => vec!["ajax", elbname.as_str(), "delete"],
            Endpoint::RemoveRoute { id } => {
                vec!["ajax", "loadbalance", "route", id.as_str(), "remove"]
            }
            Endpoint::DeleteEnv { app } => vec!["ajax", "app", app.as_str(), "delete-env"],
            Endpoint::SwitchZone => vec!["ajax", "switch-zone"],
        }
    }

    /// Absolute URL under `base`. Path parameters are percent-encoded.
    pub fn url(&self, base: &Url) -> Result<Url> {
        let mut url = join_segments(base, &self.segments())?;
        if let Endpoint::ImageEntrypoints { image } = self {
            url.query_pairs_mut().append_pair("image", image);
        }
        Ok(url)
    }
}

fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| ConsoleError::Config(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Progress socket `/websocket/check-{kind}`, one `task` parameter per id
pub fn check_url(ws_base: &Url, kind: &CheckKind, tasks: &[TaskId]) -> Result<Url> {
    let socket = format!("check-{}", kind.as_str());
    let mut url = join_segments(ws_base, &["websocket", socket.as_str()])?;
    {
        let mut query = url.query_pairs_mut();
        for task in tasks {
            query.append_pair("task", task.as_str());
        }
    }
    Ok(url)
}

/// Action socket `/api/action/{action}`
pub fn action_url(ws_base: &Url, request: &ActionRequest) -> Result<Url> {
    join_segments(ws_base, &["api", "action", request.path()])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

/// A node of a pod, as listed by the hosts and nodes routes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    #[serde(default)]
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub subnets: Vec<String>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}

/// Task ids of a `{task}` or `{tasks: [...]}` response
pub fn parse_task_ticket(value: &Value) -> Result<Vec<TaskId>> {
    if let Some(tasks) = value.get("tasks").and_then(Value::as_array) {
        return tasks
            .iter()
            .map(|t| match t {
                Value::String(s) => Ok(TaskId::new(s.clone())),
                other => Err(ConsoleError::Malformed(format!(
                    "task id must be a string, got {}",
                    other
                ))),
            })
            .collect();
    }
    if let Some(task) = value.get("task").and_then(Value::as_str) {
        return Ok(vec![TaskId::new(task)]);
    }
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        if !error.is_empty() {
            return Err(ConsoleError::Application(error.to_string()));
        }
    }
    Err(ConsoleError::Malformed(format!(
        "response carries no task id: {}",
        value
    )))
}

/// Client for the dashboard
#[derive(Debug, Clone)]
pub struct ConsoleClient {
    base: Url,
    ws_base: Url,
    client: reqwest::Client,
    request_timeout: Duration,
    observe_timeout: Option<Duration>,
    cookie: Option<String>,
}

impl ConsoleClient {
    pub fn new(config: &ConsoleConfig) -> Result<Self> {
        let base = config.base_url()?;
        let ws_base = config.ws_url()?;

        let jar = Arc::new(Jar::default());
        let cookie = config
            .session
            .as_ref()
            .map(|session| format!("{}={}", SESSION_COOKIE, session));
        if let Some(cookie) = &cookie {
            jar.add_cookie_str(cookie, &base);
        }

        // No total timeout: progress streams may run for minutes
        let client = reqwest::Client::builder()
            .cookie_provider(jar)
            .connect_timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            base,
            ws_base,
            client,
            request_timeout: config.request_timeout(),
            observe_timeout: config.observe_timeout(),
            cookie,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn ws_url(&self) -> &Url {
        &self.ws_base
    }

    /// Observer bounded by the configured observation timeout
    pub fn observer(&self) -> Observer {
        Observer::new(self.observe_timeout)
    }

    fn request(&self, endpoint: &Endpoint) -> Result<reqwest::RequestBuilder> {
        let url = endpoint.url(&self.base)?;
        debug!(method = %endpoint.method(), url = %url, "Dashboard request");
        Ok(self
            .client
            .request(endpoint.method(), url)
            .timeout(self.request_timeout))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConsoleError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T> {
        let resp = self.send(self.request(&endpoint)?).await?;
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ConsoleError::Malformed(format!(
                "{} returned unexpected JSON: {}",
                endpoint.method(),
                e
            ))
        })
    }

    /// Send and parse a JSON body, tolerating empty responses
    async fn send_for_value(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let text = self.send(request).await?.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn pods(&self) -> Result<Vec<Pod>> {
        self.get_json(Endpoint::Pods).await
    }

    pub async fn hosts(&self, pod: &str) -> Result<Vec<Host>> {
        self.get_json(Endpoint::PodHosts { pod: pod.to_string() })
            .await
    }

    pub async fn nodes(&self, pod: &str) -> Result<Vec<Host>> {
        self.get_json(Endpoint::PodNodes { pod: pod.to_string() })
            .await
    }

    pub async fn networks(&self, pod: &str) -> Result<Vec<Network>> {
        self.get_json(Endpoint::PodNetworks { pod: pod.to_string() })
            .await
    }

    pub async fn release_entrypoints(&self, release: &str) -> Result<Vec<String>> {
        self.get_json(Endpoint::ReleaseEntrypoints {
            release: release.to_string(),
        })
        .await
    }

    pub async fn image_entrypoints(&self, image: &str) -> Result<Vec<String>> {
        self.get_json(Endpoint::ImageEntrypoints {
            image: image.to_string(),
        })
        .await
    }

    /// Start creating a load balancer; returns the task to observe
    pub async fn add_load_balance(&self, form: &LoadBalanceForm) -> Result<TaskId> {
        form.validate()?;
        let request = self.request(&Endpoint::AddLoadBalance)?.form(form);
        let value = self.send_for_value(request).await?;
        let task = first_task(parse_task_ticket(&value)?)?;
        info!(task_id = %task, image = %form.image, "Load balancer creation started");
        Ok(task)
    }

    /// Start containers for a release version; one task per container
    pub async fn create_container(
        &self,
        app: &str,
        sha: &str,
        form: &DeployForm,
    ) -> Result<Vec<TaskId>> {
        form.validate()?;
        let endpoint = Endpoint::CreateContainer {
            app: app.to_string(),
            sha: sha.to_string(),
        };
        let value = self
            .send_for_value(self.request(&endpoint)?.json(form))
            .await?;
        let tasks = parse_task_ticket(&value)?;
        info!(app, sha, tasks = tasks.len(), "Container creation started");
        Ok(tasks)
    }

    pub async fn build_image(&self, app: &str, sha: &str) -> Result<TaskId> {
        let endpoint = Endpoint::BuildImage {
            app: app.to_string(),
            sha: sha.to_string(),
        };
        let value = self.send_for_value(self.request(&endpoint)?).await?;
        let task = first_task(parse_task_ticket(&value)?)?;
        info!(task_id = %task, app, sha, "Image build started");
        Ok(task)
    }

    /// Enable or disable traffic analysis for a load balancer record
    pub async fn set_analysis(&self, record: &str, enable: bool) -> Result<()> {
        let endpoint = Endpoint::Analysis {
            record: record.to_string(),
            enable,
        };
        self.send(self.request(&endpoint)?).await?;
        Ok(())
    }

    pub async fn remove_load_balance(&self, id: &str) -> Result<()> {
        self.send(self.request(&Endpoint::RemoveLoadBalance { id: id.to_string() })?)
            .await?;
        info!(id, "Load balancer removed");
        Ok(())
    }

    pub async fn delete_rule(&self, elbname: &str, domain: &str) -> Result<()> {
        let endpoint = Endpoint::DeleteRule {
            elbname: elbname.to_string(),
        };
        self.send(self.request(&endpoint)?.json(&json!({ "domain": domain })))
            .await?;
        info!(elbname, domain, "Rule deleted");
        Ok(())
    }

    pub async fn remove_route(&self, id: &str) -> Result<()> {
        self.send(self.request(&Endpoint::RemoveRoute { id: id.to_string() })?)
            .await?;
        Ok(())
    }

    pub async fn delete_env(&self, app: &str, env: &str) -> Result<()> {
        let endpoint = Endpoint::DeleteEnv {
            app: app.to_string(),
        };
        self.send(self.request(&endpoint)?.form(&[("env", env)]))
            .await?;
        Ok(())
    }

    /// Switch the session's zone. Needs a session cookie to stick.
    pub async fn switch_zone(&self, zone: &str) -> Result<()> {
        self.send(self.request(&Endpoint::SwitchZone)?.form(&[("zone", zone)]))
            .await?;
        info!(zone, "Zone switched");
        Ok(())
    }

    fn websocket(&self, url: Url) -> WebSocketSource {
        let source = WebSocketSource::new(url);
        match &self.cookie {
            Some(cookie) => source.with_cookie(cookie.clone()),
            None => source,
        }
    }

    /// Channels following `tasks` on `check-{kind}` sockets: one socket per
    /// task, or one socket carrying every task when `multiplex` is set.
    pub fn check_channels(
        &self,
        kind: &CheckKind,
        tasks: &[TaskId],
        multiplex: bool,
    ) -> Result<Vec<Channel>> {
        if tasks.is_empty() {
            return Err(ConsoleError::Validation("no tasks to observe".to_string()));
        }
        if multiplex && tasks.len() > 1 {
            let url = check_url(&self.ws_base, kind, tasks)?;
            return Ok(vec![Channel::multiplexed(tasks.to_vec(), self.websocket(url))]);
        }
        tasks
            .iter()
            .map(|task| {
                let url = check_url(&self.ws_base, kind, std::slice::from_ref(task))?;
                Ok(Channel::new(task.clone(), self.websocket(url)))
            })
            .collect()
    }

    /// Channel for an action socket; the request is sent as the first frame
    pub fn action_channel(&self, request: &ActionRequest) -> Result<Channel> {
        request.validate()?;
        let url = action_url(&self.ws_base, request)?;
        let source = self.websocket(url).with_payload(request.to_json()?);
        Ok(Channel::new(TaskId::new(request.path()), source))
    }

    /// Channel streaming a release deploy over chunked HTTP
    pub fn deploy_channel(&self, release: &str, form: &DeployForm) -> Result<Channel> {
        form.validate()?;
        let url = Endpoint::DeployRelease {
            release: release.to_string(),
        }
        .url(&self.base)?;
        let body = serde_json::to_value(form)?;
        let source = HttpStreamSource::post_json(self.client.clone(), url, body);
        Ok(Channel::new(TaskId::new(format!("release-{}", release)), source))
    }
}

fn first_task(tasks: Vec<TaskId>) -> Result<TaskId> {
    tasks
        .into_iter()
        .next()
        .ok_or_else(|| ConsoleError::Malformed("response carries an empty task list".to_string()))
}
