//! Deploy, create-container and build commands

use crate::progress::follow;
use crate::style::*;
use crate::DeployOpts;
use anyhow::Result;
use citadel_console::{CheckKind, ConsoleClient, DeployForm, SuccessAction};

impl From<DeployOpts> for DeployForm {
    fn from(opts: DeployOpts) -> Self {
        DeployForm {
            podname: opts.pod,
            nodename: opts.node,
            entrypoint: opts.entrypoint,
            envname: opts.envname,
            count: opts.count,
            cpu: opts.cpu,
            memory: opts.memory,
            extra_env: opts.extra_env,
            networks: opts.networks,
            debug: opts.debug,
        }
    }
}

fn print_deploy_summary(form: &DeployForm) {
    print_key_value("Pod", &form.podname);
    if !form.nodename.is_empty() {
        print_key_value("Node", &form.nodename);
    }
    print_key_value("Entrypoint", &form.entrypoint);
    print_key_value("Count", &form.count.to_string());
    print_key_value("CPU", &form.cpu.to_string());
    print_key_value("Memory", &form.memory);
    if !form.networks.is_empty() {
        print_key_value("Networks", &form.networks.join(", "));
    }
    println!();
}

/// Deploy a release over the chunked HTTP progress stream
pub async fn run(
    client: &ConsoleClient,
    release: &str,
    opts: DeployOpts,
    return_url: Option<String>,
) -> Result<()> {
    let form = DeployForm::from(opts);
    print_header(&format!("Deploy release {}", release));
    print_deploy_summary(&form);

    let channel = client.deploy_channel(release, &form)?;
    let on_success = match return_url {
        Some(url) => SuccessAction::StripFragment(url),
        None => SuccessAction::Reload,
    };
    follow(client, "Deploy", vec![channel], on_success).await?;
    Ok(())
}

pub async fn create_container(
    client: &ConsoleClient,
    app: &str,
    sha: &str,
    opts: DeployOpts,
    multiplex: bool,
) -> Result<()> {
    let form = DeployForm::from(opts);
    print_header(&format!("Create containers for {} @ {}", app, sha));
    print_deploy_summary(&form);

    let tasks = client.create_container(app, sha, &form).await?;
    print_step(&format!("Started {} task(s)", tasks.len()));

    let channels = client.check_channels(&CheckKind::Container, &tasks, multiplex)?;
    follow(client, "Container creation", channels, SuccessAction::Reload).await?;
    Ok(())
}

pub async fn build(client: &ConsoleClient, app: &str, sha: &str) -> Result<()> {
    print_header(&format!("Build {} @ {}", app, sha));

    let task = client.build_image(app, sha).await?;
    print_step(&format!("Build task {}", style_dim(task.as_str())));

    let channels = client.check_channels(&CheckKind::Build, &[task], false)?;
    follow(client, "Build", channels, SuccessAction::Reload).await?;
    Ok(())
}
