// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use labtest::{
    config::Config,
    db,
    models::{
        lab::{NewLab, Quota},
        question::{Category, NewQuestion, QuestionKind},
    },
    session::{ManualTime, QuestionBank, TestSessionEngine},
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub const DEFAULT_QUOTA: Quota = Quota {
    theory_count: 2,
    practice_count: 2,
    graphic_count: 1,
};

/// In-memory database with the schema applied.
/// A single connection that never recycles keeps the memory database alive.
pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    db::migrate(&pool).await.expect("Failed to migrate database");
    pool
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        rust_log: "error".to_string(),
        log_dir: "logs".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        test_duration_minutes: 20,
        default_quota: DEFAULT_QUOTA,
        tick_interval_ms: 10,
        seed_file: None,
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub fn manual_time() -> Arc<ManualTime> {
    Arc::new(ManualTime::new(t0()))
}

pub fn engine(pool: &SqlitePool, time: &Arc<ManualTime>) -> TestSessionEngine {
    TestSessionEngine::new(pool.clone(), &test_config(), time.clone())
}

/// Single-choice question whose correct option is index 0.
pub fn question(category: Category, n: usize) -> NewQuestion {
    NewQuestion {
        category,
        kind: QuestionKind::SingleChoice,
        text: format!("{} question {}", category.as_str(), n),
        options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        correct_answer: "0".to_string(),
        tolerance: None,
        image_path: None,
        points: 1,
    }
}

/// Seeds a lab with the given pool sizes per category and the default 2+2+1 quota.
pub async fn seed_lab(bank: &QuestionBank, theory: usize, practice: usize, graphic: usize) -> i64 {
    let mut questions = Vec::new();
    questions.extend((0..theory).map(|i| question(Category::Theory, i)));
    questions.extend((0..practice).map(|i| question(Category::Practice, i)));
    questions.extend((0..graphic).map(|i| question(Category::Graphic, i)));

    let lab = NewLab {
        title: "Linear DC circuit".to_string(),
        description: Some("Test lab".to_string()),
        quota: None,
        duration_minutes: None,
        questions,
    };
    bank.seed_lab(&lab, DEFAULT_QUOTA).await.expect("Failed to seed lab")
}

pub async fn insert_student(pool: &SqlitePool, surname: &str) -> i64 {
    sqlx::query("INSERT INTO students (surname, name, group_name, created_at) VALUES (?, ?, ?, ?)")
        .bind(surname)
        .bind("Ivan")
        .bind("PS4-51")
        .bind(t0())
        .execute(pool)
        .await
        .expect("Failed to insert student")
        .last_insert_rowid()
}
