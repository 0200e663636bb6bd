//! Read-only listings: pods, nodes, hosts, networks, entrypoints

use crate::style::*;
use anyhow::Result;
use citadel_console::{ConsoleClient, Host};

pub async fn pods(client: &ConsoleClient) -> Result<()> {
    let pods = client.pods().await?;
    print_header("Pods");

    let mut table = table(["Name", "Description"]);
    for pod in &pods {
        table.add_row(vec![pod.name.as_str(), pod.desc.as_str()]);
    }
    println!("{table}");
    Ok(())
}

pub async fn nodes(client: &ConsoleClient, pod: &str) -> Result<()> {
    let nodes = client.nodes(pod).await?;
    print_hosts(&format!("Nodes of {}", pod), &nodes);
    Ok(())
}

pub async fn hosts(client: &ConsoleClient, pod: &str) -> Result<()> {
    let hosts = client.hosts(pod).await?;
    print_hosts(&format!("Hosts of {}", pod), &hosts);
    Ok(())
}

fn print_hosts(title: &str, hosts: &[Host]) {
    print_header(title);
    if hosts.is_empty() {
        print_warning("None");
        return;
    }
    let mut table = table(["Name", "IP"]);
    for host in hosts {
        table.add_row(vec![host.name.as_str(), host.ip.as_str()]);
    }
    println!("{table}");
}

pub async fn networks(client: &ConsoleClient, pod: &str) -> Result<()> {
    let networks = client.networks(pod).await?;
    print_header(&format!("Networks of {}", pod));

    let mut table = table(["Name", "Subnets"]);
    for network in &networks {
        table.add_row(vec![network.name.clone(), network.subnets.join(", ")]);
    }
    println!("{table}");
    Ok(())
}

pub async fn entrypoints(
    client: &ConsoleClient,
    release: Option<String>,
    image: Option<String>,
) -> Result<()> {
    let (title, entrypoints) = match (release, image) {
        (Some(release), _) => (
            format!("Entrypoints of release {}", release),
            client.release_entrypoints(&release).await?,
        ),
        (None, Some(image)) => (
            format!("Entrypoints of {}", image),
            client.image_entrypoints(&image).await?,
        ),
        (None, None) => anyhow::bail!("either --release or --image is required"),
    };

    print_header(&title);
    for entrypoint in &entrypoints {
        println!("  {} {}", style_cyan("•"), entrypoint);
    }
    Ok(())
}
