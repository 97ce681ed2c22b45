// src/session/bank.rs

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        lab::{Lab, NewLab, Quota},
        question::{Category, Question},
    },
};

const LAB_COLUMNS: &str =
    "id, title, description, theory_count, practice_count, graphic_count, duration_minutes";

const QUESTION_COLUMNS: &str =
    "id, lab_id, category, kind, text, options, correct_answer, tolerance, image_path, points";

/// Read access to labs and their question pools, plus the bulk seeding interface.
#[derive(Clone)]
pub struct QuestionBank {
    pool: SqlitePool,
}

impl QuestionBank {
    pub fn new(pool: SqlitePool) -> Self {
        QuestionBank { pool }
    }

    /// All labs ordered by id.
    pub async fn get_labs(&self) -> AppResult<Vec<Lab>> {
        let labs = sqlx::query_as::<_, Lab>(&format!("SELECT {LAB_COLUMNS} FROM labs ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(labs)
    }

    pub async fn get_lab_details(&self, lab_id: i64) -> AppResult<Lab> {
        if lab_id < 0 {
            return Err(AppError::NotFound(format!("Lab {} not found", lab_id)));
        }

        sqlx::query_as::<_, Lab>(&format!("SELECT {LAB_COLUMNS} FROM labs WHERE id = ?"))
            .bind(lab_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lab {} not found", lab_id)))
    }

    /// Draws a fresh question set for one test.
    ///
    /// Each category is sampled uniformly without replacement up to the lab's quota.
    /// A pool smaller than its quota is an error, never a shorter test.
    pub async fn sample_questions(&self, lab_id: i64) -> AppResult<Vec<Question>> {
        let lab = self.get_lab_details(lab_id).await?;
        let mut paper = Vec::with_capacity(lab.quota.total().max(0) as usize);

        for category in Category::ALL {
            let required = lab.quota.for_category(category);
            if required <= 0 {
                continue;
            }

            let drawn = sqlx::query_as::<_, Question>(&format!(
                "SELECT {QUESTION_COLUMNS} FROM questions
                 WHERE lab_id = ? AND category = ?
                 ORDER BY RANDOM()
                 LIMIT ?"
            ))
            .bind(lab_id)
            .bind(category)
            .bind(required)
            .fetch_all(&self.pool)
            .await?;

            let available = drawn.len() as i64;
            if available < required {
                tracing::warn!(
                    "Lab {} has {} {} question(s), quota is {}",
                    lab_id,
                    available,
                    category.as_str(),
                    required
                );
                return Err(AppError::InsufficientQuestions {
                    lab_id,
                    category,
                    required,
                    available,
                });
            }

            paper.extend(drawn);
        }

        Ok(paper)
    }

    /// Loads questions by id, preserving the order of `ids`.
    pub async fn get_questions(&self, ids: &[i64]) -> AppResult<Vec<Question>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id IN ("
        ));
        let mut separated = query_builder.separated(",");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<Question> = query_builder.build_query_as().fetch_all(&self.pool).await?;
        let mut by_id: HashMap<i64, Question> = rows.into_iter().map(|q| (q.id, q)).collect();

        ids.iter()
            .map(|id| {
                by_id
                    .remove(id)
                    .ok_or_else(|| AppError::NotFound(format!("Question {} not found", id)))
            })
            .collect()
    }

    pub async fn lab_count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM labs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Inserts a lab and its question pool in one transaction.
    pub async fn seed_lab(&self, lab: &NewLab, default_quota: Quota) -> AppResult<i64> {
        lab.validate()?;
        let quota = lab.quota.unwrap_or(default_quota);

        let mut tx = self.pool.begin().await?;

        let lab_id = sqlx::query(
            "INSERT INTO labs (title, description, theory_count, practice_count, graphic_count, duration_minutes)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&lab.title)
        .bind(&lab.description)
        .bind(quota.theory_count)
        .bind(quota.practice_count)
        .bind(quota.graphic_count)
        .bind(lab.duration_minutes)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for q in &lab.questions {
            sqlx::query(
                "INSERT INTO questions (lab_id, category, kind, text, options, correct_answer, tolerance, image_path, points)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(lab_id)
            .bind(q.category)
            .bind(q.kind)
            .bind(&q.text)
            .bind(Json(&q.options))
            .bind(q.correct_answer.trim())
            .bind(q.tolerance)
            .bind(&q.image_path)
            .bind(q.points)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Seeded lab {} '{}' with {} question(s)",
            lab_id,
            lab.title,
            lab.questions.len()
        );
        Ok(lab_id)
    }
}
