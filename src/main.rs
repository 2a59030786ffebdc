//! OnlyCat Gateway CLI
//!
//! Connects to the gateway with a token and logs events until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! # Log every connect/disconnect, plus chosen events
//! ONLYCAT_TOKEN=... onlycat-gateway --listen deviceEvent --listen userEventUpdate
//!
//! # Issue one request and print the reply
//! onlycat-gateway --token ... --call getDevices --payload '{"subscribe": false}'
//!
//! # Use a config file
//! onlycat-gateway --config /path/to/config.toml
//! ```

use clap::Parser;
use onlycat_gateway::config::default_config_path;
use onlycat_gateway::{ClientConfig, GatewayClient, DISCONNECT_EVENT};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "onlycat-gateway")]
#[command(about = "Real-time client for the OnlyCat event gateway")]
struct Args {
    /// Gateway access token
    #[arg(long, env = "ONLYCAT_TOKEN", hide_env_values = true)]
    token: String,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gateway base URL
    #[arg(long, env = "ONLYCAT_GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Log every occurrence of this event (repeatable)
    #[arg(long = "listen")]
    listen: Vec<String>,

    /// Send one request with this event name, print the reply, and exit
    #[arg(long)]
    call: Option<String>,

    /// JSON payload for --call
    #[arg(long, default_value = "null", requires = "call")]
    payload: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("onlycat_gateway=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let default_path = default_config_path();
    let mut config = if let Some(config_path) = &args.config {
        ClientConfig::load(config_path)?
    } else if default_path.exists() {
        ClientConfig::load(&default_path)?
    } else {
        ClientConfig::default()
    };

    // Apply CLI overrides
    if let Some(url) = args.gateway_url {
        config.gateway_url = url;
    }

    let payload: Value = serde_json::from_str(&args.payload)?;

    let client = GatewayClient::new(args.token, config);

    client.add_event_listener(DISCONNECT_EVENT, |args| async move {
        info!(args = ?args, "Disconnected from gateway");
        Ok(())
    });
    for event in args.listen {
        let name = event.clone();
        client.add_event_listener(&event, move |args| {
            let name = name.clone();
            async move {
                let args = Value::Array(args);
                info!(event = %name, args = %args, "Gateway event");
                Ok(())
            }
        });
    }

    if let Err(e) = client.connect().await {
        if e.is_authentication() {
            error!(error = %e, "Gateway rejected the token");
        } else {
            error!(error = %e, "Could not reach the gateway");
        }
        return Err(e.into());
    }

    if let Some(event) = args.call {
        let result = client.send_message(&event, payload).await;
        client.disconnect().await;
        match result? {
            Some(reply) => println!("{}", serde_json::to_string_pretty(&reply)?),
            None => println!("null"),
        }
        return Ok(());
    }

    tokio::select! {
        _ = client.wait() => {
            info!("Gateway connection closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            client.disconnect().await;
        }
    }

    Ok(())
}
