//! Actions run over `/api/action/*` WebSockets

use crate::progress::follow;
use crate::style::*;
use crate::ActionCommand;
use anyhow::Result;
use citadel_console::forms::{BuildArgs, DeployArgs, DeployElbArgs, RemoveArgs, RenewArgs};
use citadel_console::{ActionRequest, ConsoleClient, SuccessAction};

fn request(command: ActionCommand, zone: &str) -> ActionRequest {
    match command {
        ActionCommand::Build { app, sha } => ActionRequest::Build(BuildArgs { appname: app, sha }),
        ActionCommand::Deploy {
            app,
            sha,
            combo,
            pod,
            node,
            extra_args,
            cpu_quota,
            memory,
            count,
            debug,
        } => ActionRequest::Deploy(DeployArgs {
            appname: app,
            zone: zone.to_string(),
            sha,
            combo_name: combo,
            podname: pod,
            nodename: node,
            extra_args,
            cpu_quota,
            memory,
            count,
            debug,
        }),
        ActionCommand::Renew { container_ids, sha } => {
            ActionRequest::Renew(RenewArgs { container_ids, sha })
        }
        ActionCommand::Remove { container_ids } => {
            ActionRequest::Remove(RemoveArgs { container_ids })
        }
        ActionCommand::DeployElb {
            name,
            sha,
            combo,
            node,
        } => ActionRequest::DeployElb(DeployElbArgs {
            name,
            zone: zone.to_string(),
            sha,
            combo_name: combo,
            nodename: node,
        }),
    }
}

pub async fn run(
    client: &ConsoleClient,
    command: ActionCommand,
    zone: &str,
    yes: bool,
) -> Result<()> {
    let request = request(command, zone);
    request.validate()?;

    if let ActionRequest::Remove(args) = &request {
        let prompt = format!("Remove {} container(s)?", args.container_ids.len());
        if !confirm(&prompt, yes)? {
            print_warning("Cancelled");
            return Ok(());
        }
    }

    print_header(&format!("Action {}", request.path()));
    let channel = client.action_channel(&request)?;
    follow(client, request.path(), vec![channel], SuccessAction::Reload).await?;
    Ok(())
}
