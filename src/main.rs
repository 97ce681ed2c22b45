// src/main.rs

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use labtest::config::Config;
use labtest::session::{self, AttemptStore, QuestionBank, SystemTime, TestSessionEngine, TimeSource};
use labtest::state::AppState;
use labtest::{db, routes};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "labtest.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let pool = db::connect(&config)
        .await
        .expect("Failed to open the local database");
    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    db::migrate(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");
    tracing::info!(
        "Tests last {} min with {} question(s) by default",
        config.test_duration_minutes,
        config.questions_per_test()
    );

    let time: Arc<dyn TimeSource> = Arc::new(SystemTime);
    let bank = QuestionBank::new(pool.clone());
    let store = AttemptStore::new(pool.clone(), time.clone());

    // Seed labs and questions into an empty bank
    if let Some(seed_file) = &config.seed_file {
        if let Err(e) = db::seed_from_file(&bank, Path::new(seed_file), &config).await {
            tracing::error!("Failed to seed question bank: {}", e);
        }
    }

    let engine = session::ticker::shared(TestSessionEngine::new(pool.clone(), &config, time));
    let _ticker = session::spawn_ticker(engine.clone(), Duration::from_millis(config.tick_interval_ms));

    let state = AppState {
        pool,
        config: config.clone(),
        bank,
        store,
        engine,
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .expect("BIND_ADDR must be a socket address");
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind the API address");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}
