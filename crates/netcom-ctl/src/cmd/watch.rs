//! `watch`: stay subscribed and poll the listing until interrupted.

use std::time::Duration;

use anyhow::Result;

use netcom_core::Endpoint;

use super::client::Client;
use super::list::{print_clients, RESPONSE_TIMEOUT};

pub async fn cmd_watch(endpoint: &Endpoint, interval: Duration) -> Result<()> {
    let mut client = Client::connect(endpoint).await?;
    client.subscribe().await?;
    println!("Watching {} every {:?}, Ctrl-C to stop.", client.server(), interval);

    let mut ticker = tokio::time::interval(interval);
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            _ = ticker.tick() => {
                match client.request_info(RESPONSE_TIMEOUT).await {
                    Ok(clients) => {
                        println!();
                        print_clients(endpoint, &clients);
                    }
                    Err(e) => break Err(e),
                }
            }
        }
    };

    let _ = client.unsubscribe().await;
    result
}
