//! `ping`: subscribe, send Ping once per second, unsubscribe.

use std::time::Duration;

use anyhow::Result;

use netcom_core::Endpoint;

use super::client::Client;

pub async fn cmd_ping(endpoint: &Endpoint, count: u32) -> Result<()> {
    let mut client = Client::connect(endpoint).await?;
    client.subscribe().await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for seq in 1..=count {
        ticker.tick().await;
        client.ping().await?;
        println!("ping {seq}/{count} -> {}", client.server());
    }

    client.unsubscribe().await?;
    Ok(())
}
