//! Follow tasks that are already running

use crate::progress::follow;
use crate::style::*;
use anyhow::Result;
use citadel_console::{CheckKind, ConsoleClient, SuccessAction, TaskId};

pub async fn run(
    client: &ConsoleClient,
    kind: &str,
    tasks: Vec<String>,
    multiplex: bool,
) -> Result<()> {
    let kind: CheckKind = kind.parse()?;
    let tasks: Vec<TaskId> = tasks.into_iter().map(TaskId::from).collect();

    println!(
        "Watching {} task(s) on check-{}... (Ctrl+C to stop)",
        tasks.len(),
        kind.as_str()
    );
    println!();

    let channels = client.check_channels(&kind, &tasks, multiplex)?;
    let outcome = follow(client, "Tasks", channels, SuccessAction::Reload).await?;

    if outcome.tasks.len() > 1 {
        let mut table = table(["Task", "Outcome"]);
        for (task, result) in &outcome.tasks {
            let label = match result {
                citadel_console::TaskOutcome::Succeeded => "succeeded".to_string(),
                citadel_console::TaskOutcome::Ended => "ended".to_string(),
                citadel_console::TaskOutcome::Failed(e) => e.user_message(),
            };
            table.add_row(vec![task.to_string(), label]);
        }
        println!("{table}");
    }
    Ok(())
}
