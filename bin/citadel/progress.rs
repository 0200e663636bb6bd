//! Live rendering of an observation in the terminal

use crate::style::*;
use anyhow::{anyhow, Result};
use citadel_console::{
    Channel, ConsoleClient, LogLine, LogView, Outcome, SuccessAction, ViewTransition,
};
use indicatif::ProgressBar;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Follow `channels` until every task finished, printing log lines as they
/// arrive. Ctrl+C tears the observation down.
pub async fn follow(
    client: &ConsoleClient,
    label: &str,
    channels: Vec<Channel>,
    on_success: SuccessAction,
) -> Result<Outcome> {
    follow_until(client, label, channels, on_success, tokio::signal::ctrl_c()).await
}

async fn follow_until<I: Future>(
    client: &ConsoleClient,
    label: &str,
    channels: Vec<Channel>,
    on_success: SuccessAction,
    interrupt: I,
) -> Result<Outcome> {
    let multi = channels.iter().map(|c| c.tasks().len()).sum::<usize>() > 1;
    let view = LogView::new(on_success);
    let mut observation = client.observer().observe(channels, view.clone())?;
    debug!(observation = %observation.id(), "Following {}", label);

    let bar = spinner(label)?;
    let mut printed = 0;
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    tokio::pin!(interrupt);

    let finished = loop {
        tokio::select! {
            outcome = observation.wait() => break Some(outcome),
            _ = &mut interrupt => break None,
            _ = refresh.tick() => printed = render(&view, &bar, printed, multi),
        }
    };
    render(&view, &bar, printed, multi);
    bar.finish_and_clear();

    let outcome = match finished {
        Some(outcome) => outcome?,
        None => {
            observation.cancel().await;
            print_warning("Cancelled, progress stream closed");
            return Err(anyhow!("cancelled"));
        }
    };

    match view.transition() {
        Some(ViewTransition::Reload) | None => print_success(&format!("{} finished", label)),
        Some(ViewTransition::Navigate(url)) => {
            print_success(&format!("{} finished", label));
            print_info(&format!("Continue at {}", url));
        }
        Some(ViewTransition::ShowError(message)) => {
            print_error(&message);
            let failed = outcome.failures().count();
            return Err(anyhow!("{} of {} task(s) failed", failed, outcome.tasks.len()));
        }
    }
    Ok(outcome)
}

fn render(view: &LogView, bar: &ProgressBar, printed: usize, multi: bool) -> usize {
    let lines = view.lines_since(printed);
    for line in &lines {
        bar.println(format_line(line, multi));
    }
    printed + lines.len()
}

fn format_line(line: &LogLine, multi: bool) -> String {
    let text = if line.is_error {
        style_red(&line.text)
    } else {
        line.text.clone()
    };
    match (&line.task, multi) {
        (Some(task), true) => format!("{} {}", style_gray(&format!("[{}]", task)), text),
        _ => text,
    }
}
