use clap::Parser;
use std::time::Duration;

use clinicnotify::client::{AgentOptions, ConnectionState, HttpConnector, NotificationAgent};
use clinicnotify::realtime::events::NotificationEvent;

#[derive(Parser)]
#[command(name = "clinic-listen")]
#[command(about = "Print a user's live notifications as they arrive")]
struct Cli {
    /// Base URL of the notification server
    #[arg(long, default_value = "http://127.0.0.1:39100", env = "CLINIC_URL")]
    url: String,
    /// Bearer token of the listening user
    #[arg(long, env = "CLINIC_TOKEN")]
    token: String,
    /// Id of the listening user (must match the token)
    #[arg(long)]
    user_id: String,
    /// Seconds to wait before reconnecting after the stream drops
    #[arg(long, default_value_t = 5)]
    reconnect_delay: u64,
    /// Give up after this many consecutive failed reconnects
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinicnotify=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let agent = NotificationAgent::with_options(
        HttpConnector::new(&cli.url, &cli.token),
        AgentOptions {
            reconnect_delay: Duration::from_secs(cli.reconnect_delay),
            max_reconnect_attempts: cli.max_attempts,
        },
    );

    agent.subscribe("notification", |event: &NotificationEvent| {
        let title = event.data["title"].as_str().unwrap_or("(untitled)");
        let message = event.data["message"].as_str().unwrap_or("");
        println!("[notification] {title}: {message}");
    });
    agent.subscribe_all(|event: &NotificationEvent| {
        tracing::debug!(event_type = %event.event_type, data = %event.data, "event received");
    });

    let mut states = agent.watch_state();
    let user_id = cli.user_id.clone();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            match *states.borrow_and_update() {
                ConnectionState::Connected => tracing::info!(user_id = %user_id, "listening"),
                ConnectionState::Disconnected => {
                    tracing::warn!(user_id = %user_id, "stream lost, waiting to reconnect")
                }
            }
        }
    });

    agent.connect(cli.user_id.clone());

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
    }
    agent.disconnect().await;
}
