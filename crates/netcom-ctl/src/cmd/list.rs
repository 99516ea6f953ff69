//! `list`: one-shot listing of registered clients.

use std::time::Duration;

use anyhow::{Context, Result};

use netcom_core::{ClientRecord, Endpoint};

use super::client::{age, Client};

pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn cmd_list(endpoint: &Endpoint, json: bool) -> Result<()> {
    let mut client = Client::connect(endpoint).await?;
    client.subscribe().await?;
    let clients = client.request_info(RESPONSE_TIMEOUT).await;
    // Leave the registry clean even if the request failed.
    let _ = client.unsubscribe().await;
    let clients = clients?;

    if json {
        let text = serde_json::to_string_pretty(&clients).context("failed to encode listing")?;
        println!("{text}");
    } else {
        print_clients(endpoint, &clients);
    }
    Ok(())
}

pub fn print_clients(endpoint: &Endpoint, clients: &[ClientRecord]) {
    println!("═══════════════════════════════════════");
    println!("  Registered Clients ({}) @ {}", clients.len(), endpoint);
    println!("═══════════════════════════════════════");

    if clients.is_empty() {
        println!("  No clients registered.");
        return;
    }
    for c in clients {
        println!("  {:<40} {:>5}   registered {} ago", c.address, c.port, age(c.registered_at));
    }
}
