//! Session zone and app environment commands

use crate::style::*;
use anyhow::Result;
use citadel_console::ConsoleClient;

pub async fn switch(client: &ConsoleClient, zone: &str) -> Result<()> {
    client.switch_zone(zone).await?;
    print_success(&format!("Switched to zone {}", style_bold(zone)));
    Ok(())
}

pub async fn delete_env(client: &ConsoleClient, app: &str, env: &str, yes: bool) -> Result<()> {
    if !confirm(&format!("Delete env {} of {}?", env, app), yes)? {
        print_warning("Cancelled");
        return Ok(());
    }
    client.delete_env(app, env).await?;
    print_success(&format!("Deleted env {} of {}", env, app));
    Ok(())
}
