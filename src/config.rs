// src/config.rs

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;

use crate::models::lab::Quota;

pub const DEFAULT_TEST_DURATION_MINUTES: i64 = 20;
pub const DEFAULT_THEORY_QUESTIONS_COUNT: i64 = 2;
pub const DEFAULT_PRACTICE_QUESTIONS_COUNT: i64 = 2;
pub const DEFAULT_GRAPHIC_QUESTIONS_COUNT: i64 = 1;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub log_dir: String,
    pub bind_addr: String,

    /// Global time budget; a lab's own `duration_minutes` overrides it.
    pub test_duration_minutes: i64,

    /// Quota applied to seeded labs that do not declare their own.
    pub default_quota: Quota,

    /// Period of the expiry ticker.
    pub tick_interval_ms: u64,

    /// Optional JSON file with labs and questions, loaded into an empty bank.
    pub seed_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/labtest.db?mode=rwc".to_string());

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

        let default_quota = Quota {
            theory_count: env_or("THEORY_QUESTIONS_COUNT", DEFAULT_THEORY_QUESTIONS_COUNT),
            practice_count: env_or("PRACTICE_QUESTIONS_COUNT", DEFAULT_PRACTICE_QUESTIONS_COUNT),
            graphic_count: env_or("GRAPHIC_QUESTIONS_COUNT", DEFAULT_GRAPHIC_QUESTIONS_COUNT),
        };

        Self {
            database_url,
            rust_log,
            log_dir,
            bind_addr,
            test_duration_minutes: env_or("TEST_DURATION_MINUTES", DEFAULT_TEST_DURATION_MINUTES),
            default_quota,
            tick_interval_ms: env_or("TICK_INTERVAL_MS", 1000),
            seed_file: env::var("SEED_FILE").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Total number of questions in a test under the default quota.
    pub fn questions_per_test(&self) -> i64 {
        self.default_quota.total()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
