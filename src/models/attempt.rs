// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use super::question::AnswerValue;

/// Why an attempt was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FinishReason {
    Manual,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Finalized,
}

/// Represents one row of the 'attempts' table.
#[derive(Debug, Clone, FromRow)]
pub struct AttemptRow {
    pub id: i64,
    pub student_id: i64,
    pub lab_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub total_points: Option<i64>,
    pub max_points: Option<i64>,
    pub finish_reason: Option<FinishReason>,
}

/// An attempt together with its fixed, ordered question set.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub id: i64,
    pub student_id: i64,
    pub lab_id: i64,
    pub start_time: DateTime<Utc>,

    /// `None` while the attempt is in progress.
    pub end_time: Option<DateTime<Utc>>,

    /// Question ids drawn at start; resume never reshuffles them.
    pub question_ids: Vec<i64>,

    /// Percentage, set on finalize.
    pub score: Option<f64>,
    pub total_points: Option<i64>,
    pub max_points: Option<i64>,
    pub finish_reason: Option<FinishReason>,
}

impl Attempt {
    pub fn from_row(row: AttemptRow, question_ids: Vec<i64>) -> Self {
        Attempt {
            id: row.id,
            student_id: row.student_id,
            lab_id: row.lab_id,
            start_time: row.start_time,
            end_time: row.end_time,
            question_ids,
            score: row.score,
            total_points: row.total_points,
            max_points: row.max_points,
            finish_reason: row.finish_reason,
        }
    }

    pub fn status(&self) -> AttemptStatus {
        match self.end_time {
            None => AttemptStatus::InProgress,
            Some(_) => AttemptStatus::Finalized,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status() == AttemptStatus::InProgress
    }
}

/// Represents the 'answers' table: one row per (attempt, question).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Answer {
    pub attempt_id: i64,
    pub question_id: i64,
    pub given_answer: Json<AnswerValue>,
    pub answered_at: DateTime<Utc>,

    /// Frozen on finalize; `None` while the attempt is open.
    pub is_correct: Option<bool>,
    pub points_earned: Option<i64>,
}
