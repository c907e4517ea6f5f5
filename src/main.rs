use tokio::net::TcpListener;

use onfine::config::Config;
use onfine::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onfine=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let db = onfine::db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    let state = AppState::new(db, config.gateway.clone());
    let sessions = state.sessions.clone();
    let app = onfine::routes::router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind");

    let actual_port = listener
        .local_addr()
        .expect("failed to get local address")
        .port();
    eprintln!("  \x1b[32m→ listening on 0.0.0.0:{actual_port}\x1b[0m");
    eprintln!();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down, closing {} connection(s)", sessions.len());
            sessions.close_all();
        })
        .await
        .expect("server error");
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");

    eprintln!();
    eprintln!("  \x1b[1;36monfine\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m          {}", config.port);
    eprintln!("  \x1b[2mdatabase\x1b[0m      {}", config.database_url);
    eprintln!(
        "  \x1b[2mauth timeout\x1b[0m  {}s",
        config.gateway.auth_timeout.as_secs()
    );
    eprintln!(
        "  \x1b[2msend timeout\x1b[0m  {}s",
        config.gateway.send_timeout.as_secs()
    );
    eprintln!();
}
