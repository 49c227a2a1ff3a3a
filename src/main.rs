use tokio::net::TcpListener;

use clinicnotify::config::Config;
use clinicnotify::realtime::dispatcher::Dispatcher;
use clinicnotify::realtime::registry::ConnectionRegistry;
use clinicnotify::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinicnotify=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let db = clinicnotify::db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    let registry = ConnectionRegistry::new();
    let dispatcher = Dispatcher::new(registry.clone());

    let state = AppState {
        db,
        dispatcher,
        sse_keep_alive: config.sse_keep_alive,
        token_ttl_days: config.token_ttl_days,
    };

    let app = clinicnotify::routes::router(state);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .expect("failed to bind");

    let actual_port = listener
        .local_addr()
        .expect("failed to get local address")
        .port();
    eprintln!("  \x1b[32m→ listening on {}:{actual_port}\x1b[0m", config.host);
    eprintln!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .expect("server error");
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");

    eprintln!();
    eprintln!("  \x1b[1;36mclinicnotify\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!("  \x1b[2mdatabase\x1b[0m     {}", config.database_url);
    eprintln!(
        "  \x1b[2mkeep-alive\x1b[0m   {}s",
        config.sse_keep_alive.as_secs()
    );
    eprintln!();
}

/// Resolves on ctrl-c. Open notification streams never finish on their own,
/// so the registry is emptied here to let graceful shutdown complete.
async fn shutdown_signal(registry: ConnectionRegistry) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
    registry.close_all();
}
