// clink - command line client for a cluster master

use clap::{Parser, Subcommand};
use cluster_link::client::{ClientConfig, ClientError, NetworkClient, NetworkNode};
use cluster_link::protocol::InstanceMessage;
use cluster_link::sync::{PollPolicy, PollTick};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    version,
    about = "Connect to a cluster master as a client instance",
    long_about = None
)]
struct Cli {
    /// Master base URL
    #[arg(long, env = "CLINK_URL", default_value = "http://127.0.0.1:8880")]
    url: String,

    /// Shared cluster secret
    #[arg(long, env = "CLINK_SECRET")]
    secret: String,

    /// Name announced to the master
    #[arg(long, default_value = "clink")]
    name: String,

    /// Port announced to the master
    #[arg(long, default_value_t = 7777)]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll the master and print every inbound message
    Watch {
        /// Poll period in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,

        /// Exit after this many consecutive failed polls
        #[arg(long)]
        missed_limit: Option<u32>,
    },
    /// Print one sync var, or the master's whole table
    Vars {
        key: Option<String>,
    },
    /// Post a message; with --await, wait for its reply
    Send {
        subject: String,

        /// JSON payload
        #[arg(default_value = "null")]
        payload: String,

        /// Receiver client id; broadcast when omitted
        #[arg(long)]
        to: Option<String>,

        #[arg(long = "await")]
        wait: bool,
    },
}

struct PrintNode;

impl NetworkNode for PrintNode {
    fn receive(&self, message: &InstanceMessage) {
        match serde_json::to_string(message) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "unprintable message"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::new(&cli.url, &cli.secret)
        .with_client_name(&cli.name)
        .with_port(cli.port);

    match cli.command {
        Commands::Watch {
            interval_ms,
            missed_limit,
        } => {
            if let Some(limit) = missed_limit {
                config = config.with_poll_policy(PollPolicy::new().with_missed_poll_limit(limit));
            }
            let client = NetworkClient::builder(config)
                .node(Arc::new(PrintNode))
                .build()?;
            client.connect().await?;

            let (lost_tx, mut lost_rx) = tokio::sync::mpsc::unbounded_channel();
            let members: Mutex<Vec<String>> = Mutex::new(Vec::new());
            let poller = client.spawn_poll_loop(Duration::from_millis(interval_ms), move |tick| {
                match tick {
                    PollTick::Polled(reply) => {
                        let mut known = members.lock();
                        if *known != reply.connected_clients {
                            info!(clients = ?reply.connected_clients, "cluster membership changed");
                            *known = reply.connected_clients;
                        }
                    }
                    PollTick::Missed { consecutive } => warn!(consecutive, "poll missed"),
                    PollTick::LimitReached { consecutive } => {
                        let _ = lost_tx.send(consecutive);
                    }
                }
            });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
                Some(consecutive) = lost_rx.recv() => warn!(consecutive, "giving up on master"),
            }
            poller.stop().await;
            client.disconnect().await;
        }
        Commands::Vars { key } => {
            let client = NetworkClient::new(config)?;
            client.connect().await?;
            match key {
                Some(key) => match client.request_var::<Value>(&key).await {
                    Some(value) => println!("{}", value),
                    None => println!("{} is not set", key),
                },
                None => {
                    let entries = client.all_vars().await;
                    match serde_json::to_string_pretty(&entries) {
                        Ok(text) => println!("{}", text),
                        Err(e) => warn!(error = %e, "could not render sync entries"),
                    }
                }
            }
            client.disconnect().await;
        }
        Commands::Send {
            subject,
            payload,
            to,
            wait,
        } => {
            let payload: Value = serde_json::from_str(&payload).unwrap_or(Value::String(payload));
            let message = match &to {
                Some(receiver) => InstanceMessage::direct(&subject, payload, receiver),
                None => InstanceMessage::broadcast(&subject, payload),
            };

            let client = NetworkClient::new(config)?;
            client.connect().await?;
            if wait {
                let poller = client.spawn_poll_loop(Duration::from_millis(500), |_| {});
                let outcome = client.request(message).await;
                poller.stop().await;
                match outcome?.into_message() {
                    Some(reply) => println!("{}", reply.payload()),
                    None => println!("no reply"),
                }
            } else {
                client.send_message(message).await?;
                info!("message posted");
            }
            client.disconnect().await;
        }
    }
    Ok(())
}
