//! Citadel Console CLI
//!
//! Command-line front end for the Citadel dashboard: inspect pods, deploy
//! releases, build images, manage load balancers and follow task progress.

mod commands;
mod progress;
mod style;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use citadel_console::{ConsoleClient, ConsoleConfig};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "citadel")]
#[command(about = "Console for the Citadel container platform")]
#[command(version)]
struct Cli {
    /// Dashboard URL
    #[arg(long, global = true, env = "CITADEL_URL")]
    url: Option<String>,

    /// WebSocket URL (derived from --url when omitted)
    #[arg(long, global = true, env = "CITADEL_WS_URL")]
    ws_url: Option<String>,

    /// Config file (defaults to <config dir>/citadel/config.toml)
    #[arg(long, global = true, env = "CITADEL_CONFIG")]
    config: Option<PathBuf>,

    /// Bound on task progress in seconds, 0 waits forever
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Zone to switch to before running the command
    #[arg(long, global = true)]
    zone: Option<String>,

    /// Dashboard session cookie
    #[arg(long, global = true, env = "CITADEL_SESSION", hide_env_values = true)]
    session: Option<String>,

    /// Follow several tasks over one progress socket
    #[arg(long, global = true)]
    multiplex: bool,

    /// Skip confirmation prompts
    #[arg(short, long, global = true)]
    yes: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List pods
    Pods,

    /// List the nodes of a pod
    Nodes { pod: String },

    /// List the hosts of a pod
    Hosts { pod: String },

    /// List the networks of a pod
    Networks { pod: String },

    /// List entrypoints of a release or of a load balancer image
    Entrypoints {
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        release: Option<String>,
        #[arg(long)]
        image: Option<String>,
    },

    /// Deploy a release and stream its progress
    Deploy {
        /// Release id
        release: String,
        #[command(flatten)]
        opts: DeployOpts,
        /// Page URL to return to; its #fragment is stripped on success
        #[arg(long)]
        return_url: Option<String>,
    },

    /// Create containers for an app version and follow every task
    CreateContainer {
        app: String,
        sha: String,
        #[command(flatten)]
        opts: DeployOpts,
    },

    /// Build the image of an app version
    Build { app: String, sha: String },

    /// Load balancer management
    Lb {
        #[command(subcommand)]
        command: LbCommand,
    },

    /// Delete an environment of an app
    DeleteEnv { app: String, env: String },

    /// Switch the session's zone
    SwitchZone { zone: String },

    /// Follow running tasks on a check-* progress socket
    Watch {
        /// Socket kind: load-balance, container, build, ...
        #[arg(long, default_value = "container")]
        kind: String,
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// Run an action over its WebSocket
    Action {
        #[command(subcommand)]
        command: ActionCommand,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DeployOpts {
    #[arg(long)]
    pub pod: String,
    #[arg(long)]
    pub entrypoint: String,
    /// Node to deploy on; the scheduler picks one when omitted
    #[arg(long, default_value = "")]
    pub node: String,
    #[arg(long, default_value = "")]
    pub envname: String,
    #[arg(long, default_value_t = 1)]
    pub count: u32,
    #[arg(long, default_value_t = 0.5)]
    pub cpu: f64,
    #[arg(long, default_value = "512MiB")]
    pub memory: String,
    #[arg(long, default_value = "")]
    pub extra_env: String,
    /// Network to join, repeatable
    #[arg(long = "network")]
    pub networks: Vec<String>,
    #[arg(long)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum LbCommand {
    /// Create a load balancer and wait until it is up
    Add {
        #[arg(long)]
        image: String,
        #[arg(long)]
        pod: String,
        #[arg(long)]
        entrypoint: String,
        #[arg(long, default_value = citadel_console::forms::RANDOM_HOST)]
        host: String,
        #[arg(long, default_value_t = 1)]
        ncore: u32,
        #[arg(long, default_value = "")]
        comment: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        env: String,
    },
    /// Remove a load balancer
    Remove { id: String },
    /// Delete a domain rule from a load balancer
    DeleteRule { elbname: String, domain: String },
    /// Remove a route
    RemoveRoute { id: String },
    /// Enable (or with --disable, disable) traffic analysis for a record
    Analysis {
        record: String,
        #[arg(long)]
        disable: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ActionCommand {
    /// Build an image
    Build { app: String, sha: String },
    /// Create containers from a combo
    Deploy {
        app: String,
        sha: String,
        #[arg(long)]
        combo: String,
        #[arg(long)]
        pod: String,
        #[arg(long)]
        node: Option<String>,
        #[arg(long)]
        extra_args: Option<String>,
        #[arg(long, default_value_t = 0.5)]
        cpu_quota: f64,
        #[arg(long, default_value = "512MiB")]
        memory: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
        #[arg(long)]
        debug: bool,
    },
    /// Replace containers, optionally with another version
    Renew {
        #[arg(required = true)]
        container_ids: Vec<String>,
        #[arg(long)]
        sha: Option<String>,
    },
    /// Remove containers
    Remove {
        #[arg(required = true)]
        container_ids: Vec<String>,
    },
    /// Deploy load balancer containers
    DeployElb {
        name: String,
        sha: String,
        #[arg(long)]
        combo: String,
        #[arg(long)]
        node: Option<String>,
    },
}

impl Cli {
    fn config(&self) -> Result<ConsoleConfig> {
        let mut config = ConsoleConfig::load(self.config.as_deref())
            .context("Failed to load console configuration")?;
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(url) = &self.ws_url {
            config.ws_url = Some(url.clone());
        }
        if let Some(secs) = self.timeout {
            config.observe_timeout_secs = secs;
        }
        if let Some(zone) = &self.zone {
            config.zone = Some(zone.clone());
        }
        if let Some(session) = &self.session {
            config.session = Some(session.clone());
        }
        if self.multiplex {
            config.multiplex = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "citadel_console=debug"
    } else {
        "citadel_console=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config()?;
    let client = ConsoleClient::new(&config).context("Failed to create dashboard client")?;
    debug!(url = %client.base_url(), "Dashboard client ready");

    if let Some(zone) = &config.zone {
        if !matches!(cli.command, Commands::SwitchZone { .. }) {
            client
                .switch_zone(zone)
                .await
                .with_context(|| format!("Failed to switch to zone {}", zone))?;
        }
    }

    let result = match cli.command {
        Commands::Pods => commands::query::pods(&client).await,
        Commands::Nodes { pod } => commands::query::nodes(&client, &pod).await,
        Commands::Hosts { pod } => commands::query::hosts(&client, &pod).await,
        Commands::Networks { pod } => commands::query::networks(&client, &pod).await,
        Commands::Entrypoints { release, image } => {
            commands::query::entrypoints(&client, release, image).await
        }
        Commands::Deploy {
            release,
            opts,
            return_url,
        } => commands::deploy::run(&client, &release, opts, return_url).await,
        Commands::CreateContainer { app, sha, opts } => {
            commands::deploy::create_container(&client, &app, &sha, opts, config.multiplex).await
        }
        Commands::Build { app, sha } => commands::deploy::build(&client, &app, &sha).await,
        Commands::Lb { command } => commands::loadbalance::run(&client, command, cli.yes).await,
        Commands::DeleteEnv { app, env } => {
            commands::zone::delete_env(&client, &app, &env, cli.yes).await
        }
        Commands::SwitchZone { zone } => commands::zone::switch(&client, &zone).await,
        Commands::Watch { kind, tasks } => {
            commands::watch::run(&client, &kind, tasks, config.multiplex).await
        }
        Commands::Action { command } => {
            let zone = config.zone.clone().unwrap_or_default();
            commands::action::run(&client, command, &zone, cli.yes).await
        }
    };

    if let Err(e) = &result {
        style::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
