// src/handlers/results.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    error::AppError,
    models::result::{AnswerDetail, AttemptDetails, ResultEntry, ResultFilter},
    session::AttemptStore,
};

/// Finalized attempts for the instructor dashboard, newest first.
///
/// * Filters by group, lab and time window (on start time).
/// * `search` matches a substring of surname or name, ignoring case in any script.
pub async fn list_results(
    State(pool): State<SqlitePool>,
    Query(filter): Query<ResultFilter>,
) -> Result<impl IntoResponse, AppError> {
    let mut query_builder = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT
            a.id AS attempt_id,
            s.id AS student_id,
            s.surname,
            s.name,
            s.group_name,
            l.id AS lab_id,
            l.title AS lab_title,
            a.start_time,
            a.end_time,
            a.score,
            a.total_points,
            a.max_points,
            a.finish_reason
        FROM attempts a
        JOIN students s ON s.id = a.student_id
        JOIN labs l ON l.id = a.lab_id
        WHERE a.end_time IS NOT NULL
        "#,
    );

    if let Some(group) = filter.group.as_deref().filter(|g| !g.is_empty()) {
        query_builder.push(" AND s.group_name = ").push_bind(group.to_string());
    }
    if let Some(lab_id) = filter.lab_id {
        query_builder.push(" AND a.lab_id = ").push_bind(lab_id);
    }
    if let Some(from) = filter.from {
        query_builder.push(" AND a.start_time >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query_builder.push(" AND a.start_time <= ").push_bind(to);
    }
    query_builder.push(" ORDER BY a.end_time DESC, a.id DESC");

    let rows: Vec<ResultEntry> = query_builder
        .build_query_as()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list results: {:?}", e);
            AppError::Storage(e.to_string())
        })?;

    // SQLite folds ASCII only; names are matched here.
    let results: Vec<ResultEntry> = rows
        .into_iter()
        .filter(|r| filter.matches_name(&r.surname, &r.name))
        .collect();

    Ok(Json(results))
}

/// Per-question breakdown of one attempt: what was asked, answered and how long it took.
pub async fn attempt_details(
    State(pool): State<SqlitePool>,
    State(store): State<AttemptStore>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = store.get_attempt(attempt_id).await?;

    let questions = sqlx::query_as::<_, AnswerDetail>(
        r#"
        SELECT
            aq.position,
            q.id AS question_id,
            q.category,
            q.text,
            an.given_answer,
            an.is_correct,
            an.points_earned,
            q.points,
            COALESCE(qt.seconds, 0) AS time_spent_seconds
        FROM attempt_questions aq
        JOIN questions q ON q.id = aq.question_id
        LEFT JOIN answers an
            ON an.attempt_id = aq.attempt_id AND an.question_id = aq.question_id
        LEFT JOIN question_time qt
            ON qt.attempt_id = aq.attempt_id AND qt.question_id = aq.question_id
        WHERE aq.attempt_id = ?
        ORDER BY aq.position
        "#,
    )
    .bind(attempt_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(AttemptDetails { attempt, questions }))
}
