//! Load balancer commands

use crate::progress::follow;
use crate::style::*;
use crate::LbCommand;
use anyhow::Result;
use citadel_console::{CheckKind, ConsoleClient, LoadBalanceForm, SuccessAction};

pub async fn run(client: &ConsoleClient, command: LbCommand, yes: bool) -> Result<()> {
    match command {
        LbCommand::Add {
            image,
            pod,
            entrypoint,
            host,
            ncore,
            comment,
            name,
            env,
        } => {
            let form = LoadBalanceForm {
                image,
                podname: pod,
                hostname: host,
                entrypoint,
                ncore,
                comment,
                name,
                env,
            };
            add(client, form).await
        }
        LbCommand::Remove { id } => {
            if !confirm(&format!("Remove load balancer {}?", id), yes)? {
                print_warning("Cancelled");
                return Ok(());
            }
            client.remove_load_balance(&id).await?;
            print_success(&format!("Removed load balancer {}", id));
            Ok(())
        }
        LbCommand::DeleteRule { elbname, domain } => {
            if !confirm(&format!("Delete {} from {}?", domain, elbname), yes)? {
                print_warning("Cancelled");
                return Ok(());
            }
            client.delete_rule(&elbname, &domain).await?;
            print_success(&format!("Deleted rule {}", domain));
            Ok(())
        }
        LbCommand::RemoveRoute { id } => {
            if !confirm(&format!("Remove route {}?", id), yes)? {
                print_warning("Cancelled");
                return Ok(());
            }
            client.remove_route(&id).await?;
            print_success(&format!("Removed route {}", id));
            Ok(())
        }
        LbCommand::Analysis { record, disable } => {
            client.set_analysis(&record, !disable).await?;
            let state = if disable { "disabled" } else { "enabled" };
            print_success(&format!("Analysis {} for record {}", state, record));
            Ok(())
        }
    }
}

async fn add(client: &ConsoleClient, form: LoadBalanceForm) -> Result<()> {
    print_header("Add load balancer");
    print_key_value("Image", &form.image);
    print_key_value("Pod", &form.podname);
    print_key_value("Host", &form.hostname);
    print_key_value("Entrypoint", &form.entrypoint);
    print_key_value("Cores", &form.ncore.to_string());
    println!();

    let task = client.add_load_balance(&form).await?;
    print_step(&format!("Task {}", style_dim(task.as_str())));

    let channels = client.check_channels(&CheckKind::LoadBalance, &[task], false)?;
    follow(client, "Load balancer", channels, SuccessAction::Reload).await?;
    Ok(())
}
