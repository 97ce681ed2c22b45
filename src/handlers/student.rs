// src/handlers/student.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::student::{Student, StudentLoginRequest},
    session::AttemptStore,
};

/// Finds a student by surname, name and group, registering them on first login.
///
/// * Returns 201 when the student was created, 200 when they already existed.
pub async fn login(
    State(pool): State<SqlitePool>,
    Json(payload): Json<StudentLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let surname = payload.surname.trim();
    let name = payload.name.trim();

    let inserted = sqlx::query(
        r#"
        INSERT INTO students (surname, name, group_name, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (surname, name, group_name) DO NOTHING
        "#,
    )
    .bind(surname)
    .bind(name)
    .bind(&payload.group)
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to register student: {:?}", e);
        AppError::Storage(e.to_string())
    })?
    .rows_affected();

    let student = sqlx::query_as::<_, Student>(
        r#"
        SELECT id, surname, name, group_name, created_at
        FROM students
        WHERE surname = ? AND name = ? AND group_name = ?
        "#,
    )
    .bind(surname)
    .bind(name)
    .bind(&payload.group)
    .fetch_one(&pool)
    .await?;

    if inserted > 0 {
        tracing::info!("Registered student {} ({})", student.id, student.group_name);
        Ok((StatusCode::CREATED, Json(student)))
    } else {
        Ok((StatusCode::OK, Json(student)))
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub lab_id: Option<i64>,
}

/// A student's attempts, most recent first.
pub async fn history(
    State(store): State<AttemptStore>,
    Path(student_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = store.get_history(student_id, query.lab_id).await?;
    Ok(Json(attempts))
}
