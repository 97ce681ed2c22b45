// src/session/store.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction, types::Json};

use super::{clock::TimeSource, scoring::ScoreReport};
use crate::{
    error::{AppError, AppResult},
    models::{
        attempt::{Answer, Attempt, AttemptRow, FinishReason},
        question::AnswerValue,
    },
};

const ATTEMPT_COLUMNS: &str =
    "id, student_id, lab_id, start_time, end_time, score, total_points, max_points, finish_reason";

/// Persistent record of attempts and their answers.
///
/// Every public operation runs in exactly one transaction. Nothing here retries.
#[derive(Clone)]
pub struct AttemptStore {
    pool: SqlitePool,
    time: Arc<dyn TimeSource>,
}

impl AttemptStore {
    pub fn new(pool: SqlitePool, time: Arc<dyn TimeSource>) -> Self {
        AttemptStore { pool, time }
    }

    pub async fn find_open_attempt(&self, student_id: i64, lab_id: i64) -> AppResult<Option<Attempt>> {
        let mut tx = self.pool.begin().await?;
        let attempt = open_attempt(&mut tx, student_id, lab_id).await?;
        tx.commit().await?;
        Ok(attempt)
    }

    /// Opens a new attempt with a fixed, ordered question set.
    /// Fails with `Conflict` while another attempt for the pair is still open.
    pub async fn start_attempt(
        &self,
        student_id: i64,
        lab_id: i64,
        question_ids: &[i64],
    ) -> AppResult<Attempt> {
        let mut tx = self.pool.begin().await?;

        if let Some(open) = open_attempt(&mut tx, student_id, lab_id).await? {
            return Err(AppError::Conflict(format!(
                "Attempt {} is already open for student {} on lab {}",
                open.id, student_id, lab_id
            )));
        }

        let start_time = self.time.now();
        let attempt_id = sqlx::query(
            "INSERT INTO attempts (student_id, lab_id, start_time) VALUES (?, ?, ?)",
        )
        .bind(student_id)
        .bind(lab_id)
        .bind(start_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let db = e.as_database_error();
            if db.is_some_and(|db| db.is_unique_violation()) {
                AppError::Conflict(format!(
                    "An attempt is already open for student {} on lab {}",
                    student_id, lab_id
                ))
            } else if db.is_some_and(|db| db.is_foreign_key_violation()) {
                AppError::NotFound(format!(
                    "Student {} or lab {} does not exist",
                    student_id, lab_id
                ))
            } else {
                AppError::from(e)
            }
        })?
        .last_insert_rowid();

        for (position, question_id) in question_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO attempt_questions (attempt_id, position, question_id) VALUES (?, ?, ?)",
            )
            .bind(attempt_id)
            .bind(position as i64)
            .bind(question_id)
            .execute(&mut *tx)
            .await?;
        }

        let attempt = load_attempt(&mut tx, attempt_id).await?;
        tx.commit().await?;

        tracing::info!(
            "Started attempt {} for student {} on lab {} ({} questions)",
            attempt_id,
            student_id,
            lab_id,
            question_ids.len()
        );
        Ok(attempt)
    }

    pub async fn get_attempt(&self, attempt_id: i64) -> AppResult<Attempt> {
        let mut tx = self.pool.begin().await?;
        let attempt = load_attempt(&mut tx, attempt_id).await?;
        tx.commit().await?;
        Ok(attempt)
    }

    pub async fn get_answers(&self, attempt_id: i64) -> AppResult<Vec<Answer>> {
        let answers = sqlx::query_as::<_, Answer>(
            "SELECT attempt_id, question_id, given_answer, answered_at, is_correct, points_earned
             FROM answers
             WHERE attempt_id = ?
             ORDER BY question_id",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    /// Stores an answer; a later answer for the same question replaces the earlier one.
    pub async fn upsert_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        given_answer: &AnswerValue,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        ensure_open(&mut tx, attempt_id).await?;
        ensure_in_attempt(&mut tx, attempt_id, question_id).await?;

        sqlx::query(
            "INSERT INTO answers (attempt_id, question_id, given_answer, answered_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                given_answer = excluded.given_answer,
                answered_at = excluded.answered_at",
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(Json(given_answer))
        .bind(self.time.now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Adds time spent looking at a question.
    pub async fn record_time_spent(&self, attempt_id: i64, question_id: i64, seconds: i64) -> AppResult<()> {
        if seconds <= 0 {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        ensure_open(&mut tx, attempt_id).await?;
        ensure_in_attempt(&mut tx, attempt_id, question_id).await?;

        sqlx::query(
            "INSERT INTO question_time (attempt_id, question_id, seconds)
             VALUES (?, ?, ?)
             ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                seconds = question_time.seconds + excluded.seconds",
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(seconds)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Closes an attempt and freezes its answers.
    ///
    /// Not idempotent: a second call finds `end_time` already set and fails with
    /// `InvalidState`, leaving the first write untouched.
    pub async fn finalize(
        &self,
        attempt_id: i64,
        report: &ScoreReport,
        end_time: DateTime<Utc>,
        reason: FinishReason,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE attempts
             SET end_time = ?, score = ?, total_points = ?, max_points = ?, finish_reason = ?
             WHERE id = ? AND end_time IS NULL",
        )
        .bind(end_time)
        .bind(report.percentage)
        .bind(report.total_points)
        .bind(report.max_points)
        .bind(reason)
        .bind(attempt_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            // Distinguish a missing attempt from an already closed one.
            load_attempt(&mut tx, attempt_id).await?;
            return Err(AppError::InvalidState(format!(
                "Attempt {} is already finalized",
                attempt_id
            )));
        }

        for result in &report.per_question {
            sqlx::query(
                "UPDATE answers SET is_correct = ?, points_earned = ?
                 WHERE attempt_id = ? AND question_id = ?",
            )
            .bind(result.is_correct)
            .bind(result.points_earned)
            .bind(attempt_id)
            .bind(result.question_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Finalized attempt {} ({:?}): {}/{} points, {}%",
            attempt_id,
            reason,
            report.total_points,
            report.max_points,
            report.percentage
        );
        Ok(())
    }

    /// A student's attempts, most recent first, optionally for one lab.
    pub async fn get_history(&self, student_id: i64, lab_id: Option<i64>) -> AppResult<Vec<Attempt>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE student_id = ? AND (? IS NULL OR lab_id = ?)
             ORDER BY start_time DESC, id DESC"
        ))
        .bind(student_id)
        .bind(lab_id)
        .bind(lab_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            let ids = question_ids(&mut tx, row.id).await?;
            history.push(Attempt::from_row(row, ids));
        }

        tx.commit().await?;
        Ok(history)
    }

    /// Deletes an attempt; its question set, answers and time statistics cascade.
    pub async fn purge_attempt(&self, attempt_id: i64) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM attempts WHERE id = ?")
            .bind(attempt_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::NotFound(format!("Attempt {} not found", attempt_id)));
        }

        tracing::info!("Purged attempt {}", attempt_id);
        Ok(())
    }
}

async fn open_attempt(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    lab_id: i64,
) -> AppResult<Option<Attempt>> {
    let row = sqlx::query_as::<_, AttemptRow>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts
         WHERE student_id = ? AND lab_id = ? AND end_time IS NULL"
    ))
    .bind(student_id)
    .bind(lab_id)
    .fetch_optional(&mut **tx)
    .await?;

    match row {
        Some(row) => {
            let ids = question_ids(tx, row.id).await?;
            Ok(Some(Attempt::from_row(row, ids)))
        }
        None => Ok(None),
    }
}

async fn load_attempt(tx: &mut Transaction<'_, Sqlite>, attempt_id: i64) -> AppResult<Attempt> {
    let row = sqlx::query_as::<_, AttemptRow>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?"
    ))
    .bind(attempt_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))?;

    let ids = question_ids(tx, attempt_id).await?;
    Ok(Attempt::from_row(row, ids))
}

async fn question_ids(tx: &mut Transaction<'_, Sqlite>, attempt_id: i64) -> AppResult<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT question_id FROM attempt_questions WHERE attempt_id = ? ORDER BY position",
    )
    .bind(attempt_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(ids)
}

async fn ensure_open(tx: &mut Transaction<'_, Sqlite>, attempt_id: i64) -> AppResult<()> {
    let end_time: Option<Option<DateTime<Utc>>> =
        sqlx::query_scalar("SELECT end_time FROM attempts WHERE id = ?")
            .bind(attempt_id)
            .fetch_optional(&mut **tx)
            .await?;

    match end_time {
        None => Err(AppError::NotFound(format!("Attempt {} not found", attempt_id))),
        Some(Some(_)) => Err(AppError::InvalidState(format!(
            "Attempt {} is finalized; answers are frozen",
            attempt_id
        ))),
        Some(None) => Ok(()),
    }
}

async fn ensure_in_attempt(
    tx: &mut Transaction<'_, Sqlite>,
    attempt_id: i64,
    question_id: i64,
) -> AppResult<()> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT position FROM attempt_questions WHERE attempt_id = ? AND question_id = ?",
    )
    .bind(attempt_id)
    .bind(question_id)
    .fetch_optional(&mut **tx)
    .await?;

    if found.is_none() {
        return Err(AppError::NotFound(format!(
            "Question {} is not part of attempt {}",
            question_id, attempt_id
        )));
    }
    Ok(())
}
