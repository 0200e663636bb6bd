//! Typed dashboard forms
//!
//! Each form carries the defaults the dashboard pre-fills and validates
//! before anything is sent.

use crate::error::{ConsoleError, Result};
use serde::{Deserialize, Serialize};

/// Host placeholder that lets the scheduler pick a host
pub const RANDOM_HOST: &str = "_random";

/// Minimum length of a release sha
pub const MIN_SHA_LEN: usize = 7;

/// Length of a full container id
pub const CONTAINER_ID_LEN: usize = 64;

/// Parse a human size such as `512MiB`, `1G` or `134217728` into bytes.
/// Unit prefixes are binary (`M` and `MiB` both mean 1024²).
pub fn parse_memory(value: &str) -> Result<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| ConsoleError::Validation(format!("invalid memory size: {:?}", value)))?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" | "bytes" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        other => {
            return Err(ConsoleError::Validation(format!(
                "unknown memory unit {:?} in {:?}",
                other, value
            )))
        }
    };

    Ok((number * multiplier as f64) as u64)
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConsoleError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_sha(sha: &str) -> Result<()> {
    if sha.len() < MIN_SHA_LEN {
        return Err(ConsoleError::Validation(format!(
            "sha must be at least {} characters, got {:?}",
            MIN_SHA_LEN, sha
        )));
    }
    Ok(())
}

fn validate_container_ids(ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Err(ConsoleError::Validation(
            "at least one container id is required".to_string(),
        ));
    }
    for id in ids {
        if id.len() < CONTAINER_ID_LEN {
            return Err(ConsoleError::Validation(format!(
                "container id must be of length {}: {}",
                CONTAINER_ID_LEN, id
            )));
        }
    }
    Ok(())
}

/// Body of `POST /ajax/release/{id}/deploy`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployForm {
    pub podname: String,
    /// Empty lets the scheduler choose
    #[serde(default)]
    pub nodename: String,
    pub entrypoint: String,
    #[serde(default)]
    pub envname: String,
    pub count: u32,
    pub cpu: f64,
    pub memory: String,
    #[serde(default)]
    pub extra_env: String,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub debug: bool,
}

impl Default for DeployForm {
    fn default() -> Self {
        Self {
            podname: String::new(),
            nodename: String::new(),
            entrypoint: String::new(),
            envname: String::new(),
            count: 1,
            cpu: 0.5,
            memory: "512MiB".to_string(),
            extra_env: String::new(),
            networks: Vec::new(),
            debug: false,
        }
    }
}

impl DeployForm {
    pub fn new(podname: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            podname: podname.into(),
            entrypoint: entrypoint.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("podname", &self.podname)?;
        require("entrypoint", &self.entrypoint)?;
        if self.count == 0 {
            return Err(ConsoleError::Validation("count must be at least 1".to_string()));
        }
        if self.cpu.is_nan() || self.cpu <= 0.0 {
            return Err(ConsoleError::Validation(format!(
                "cpu must be positive, got {}",
                self.cpu
            )));
        }
        parse_memory(&self.memory)?;
        Ok(())
    }
}

/// Body of `POST /ajax/loadbalance`, sent urlencoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalanceForm {
    pub image: String,
    pub podname: String,
    pub hostname: String,
    pub entrypoint: String,
    pub ncore: u32,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub env: String,
}

impl Default for LoadBalanceForm {
    fn default() -> Self {
        Self {
            image: String::new(),
            podname: String::new(),
            hostname: RANDOM_HOST.to_string(),
            entrypoint: String::new(),
            ncore: 1,
            comment: String::new(),
            name: String::new(),
            env: String::new(),
        }
    }
}

impl LoadBalanceForm {
    pub fn validate(&self) -> Result<()> {
        require("image", &self.image)?;
        require("podname", &self.podname)?;
        require("entrypoint", &self.entrypoint)?;
        if self.ncore == 0 {
            return Err(ConsoleError::Validation("ncore must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildArgs {
    pub appname: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployArgs {
    pub appname: String,
    pub zone: String,
    pub sha: String,
    pub combo_name: String,
    pub podname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_args: Option<String>,
    pub cpu_quota: f64,
    pub memory: String,
    pub count: u32,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewArgs {
    pub container_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveArgs {
    pub container_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployElbArgs {
    pub name: String,
    pub zone: String,
    pub sha: String,
    pub combo_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodename: Option<String>,
}

/// First JSON payload sent on an action socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionRequest {
    Build(BuildArgs),
    Deploy(DeployArgs),
    Renew(RenewArgs),
    Remove(RemoveArgs),
    DeployElb(DeployElbArgs),
}

impl ActionRequest {
    /// Socket path under `/api/action/`
    pub fn path(&self) -> &'static str {
        match self {
            ActionRequest::Build(_) => "build",
            ActionRequest::Deploy(_) => "deploy",
            ActionRequest::Renew(_) => "renew",
            ActionRequest::Remove(_) => "remove",
            ActionRequest::DeployElb(_) => "deploy-elb",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ActionRequest::Build(args) => {
                require("appname", &args.appname)?;
                validate_sha(&args.sha)
            }
            ActionRequest::Deploy(args) => {
                require("appname", &args.appname)?;
                require("zone", &args.zone)?;
                require("combo_name", &args.combo_name)?;
                require("podname", &args.podname)?;
                validate_sha(&args.sha)?;
                if args.count == 0 {
                    return Err(ConsoleError::Validation("count must be at least 1".to_string()));
                }
                parse_memory(&args.memory).map(|_| ())
            }
            ActionRequest::Renew(args) => {
                validate_container_ids(&args.container_ids)?;
                match &args.sha {
                    Some(sha) => validate_sha(sha),
                    None => Ok(()),
                }
            }
            ActionRequest::Remove(args) => validate_container_ids(&args.container_ids),
            ActionRequest::DeployElb(args) => {
                require("name", &args.name)?;
                require("zone", &args.zone)?;
                require("combo_name", &args.combo_name)?;
                validate_sha(&args.sha)
            }
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
