// src/db.rs

use std::{path::Path, str::FromStr, time::Duration};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::lab::SeedFile,
    session::QuestionBank,
};
use validator::Validate;

/// Opens the SQLite pool, creating the database file (and its directory) if needed.
pub async fn connect(config: &Config) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    if let Some(dir) = options.get_filename().parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)
                .map_err(|e| AppError::Storage(format!("Cannot create {}: {}", dir.display(), e)))?;
        }
    }

    let mut retry_count = 0;
    loop {
        match SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    return Err(e.into());
                }
                tracing::warn!("Database not ready, retrying in 1s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

pub async fn migrate(pool: &SqlitePool) -> AppResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Loads labs and questions from a JSON seed file into an empty bank.
/// Returns the number of labs inserted; a populated bank is left alone.
pub async fn seed_from_file(bank: &QuestionBank, path: &Path, config: &Config) -> AppResult<usize> {
    if bank.lab_count().await? > 0 {
        tracing::info!("Question bank already populated, skipping seed");
        return Ok(0);
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::BadRequest(format!("Cannot read seed file {}: {}", path.display(), e)))?;
    let seed: SeedFile = serde_json::from_str(&raw)?;
    for lab in &seed.labs {
        lab.validate()?;
    }

    for lab in &seed.labs {
        bank.seed_lab(lab, config.default_quota).await?;
    }

    tracing::info!("Seeded {} lab(s) from {}", seed.labs.len(), path.display());
    Ok(seed.labs.len())
}
