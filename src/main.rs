// src/main.rs

use std::net::SocketAddr;

use dotenvy::dotenv;
use sage_backend::ai::AiClient;
use sage_backend::config::Config;
use sage_backend::db;
use sage_backend::routes;
use sage_backend::state::AppState;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::from_env();

    // Logs go to stdout and a daily-rotated file under logs/. The guard has
    // to outlive main or buffered lines are lost on shutdown.
    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    config.log_integrations();

    // The pool is lazy: a down database delays nothing here, and individual
    // requests fail with 503 until it comes back.
    let pool = db::lazy_pool(&config.database_url);

    // Apply migrations when the database is reachable; boot anyway when not.
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::warn!("Could not run migrations at startup: {}", e);
    } else {
        tracing::info!("Migrations applied.");
    }

    let ai = AiClient::from_config(&config);

    let port = config.port;
    let state = AppState { pool, config, ai };

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();

    // Start the server
    axum::serve(listener, app).await.unwrap();
}
