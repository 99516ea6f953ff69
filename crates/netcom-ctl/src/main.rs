//! netcom-ctl: command-line client for netcomd.

use std::time::Duration;

use anyhow::{Context, Result};

use netcom_core::Endpoint;

mod cmd;

use cmd::{list, ping, watch};

const DEFAULT_URL: &str = "tcp://localhost:7070";

fn print_usage() {
    println!("Usage: netcom-ctl [options] <command> [<protocol>://<host>:<port>]");
    println!();
    println!("Commands:");
    println!("  list          Subscribe, print the registered clients, unsubscribe");
    println!("  watch         Stay subscribed and print the listing periodically");
    println!("  ping          Subscribe, send pings, unsubscribe");
    println!();
    println!("Options:");
    println!("  --json             list: print JSON");
    println!("  --interval <secs>  watch: seconds between requests (default: 1)");
    println!("  --count <n>        ping: number of pings (default: 3)");
    println!();
    println!("The URL defaults to {DEFAULT_URL}.");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut json = false;
    let mut interval = Duration::from_secs(1);
    let mut count = 3u32;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => json = true,
            "--interval" => {
                i += 1;
                let secs: f64 = args
                    .get(i)
                    .context("--interval requires a value")?
                    .parse()
                    .context("--interval must be a number of seconds")?;
                interval = Duration::try_from_secs_f64(secs)
                    .ok()
                    .filter(|d| !d.is_zero())
                    .context("--interval must be positive")?;
            }
            "--count" => {
                i += 1;
                count = args
                    .get(i)
                    .context("--count requires a value")?
                    .parse()
                    .context("--count must be a number")?;
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    let (command, url) = match remaining.as_slice() {
        [] => ("list", DEFAULT_URL),
        [command] => (*command, DEFAULT_URL),
        [command, url] => (*command, *url),
        other => {
            eprintln!("Unexpected arguments: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return Ok(());
    }

    let endpoint: Endpoint = url
        .parse()
        .with_context(|| format!("invalid endpoint {url:?}"))?;

    match command {
        "list" => list::cmd_list(&endpoint, json).await,
        "watch" => watch::cmd_watch(&endpoint, interval).await,
        "ping" => ping::cmd_ping(&endpoint, count).await,
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
