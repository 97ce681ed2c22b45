// src/handlers/session.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    models::{attempt::FinishReason, question::AnswerValue},
    session::SharedEngine,
};

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub student_id: i64,
    pub lab_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub answer: AnswerValue,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default = "manual")]
    pub reason: FinishReason,
}

fn manual() -> FinishReason {
    FinishReason::Manual
}

/// Starts a test for the student, or resumes the one they left open.
pub async fn start(
    State(engine): State<SharedEngine>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut engine = engine.lock().await;
    let snapshot = engine.start_or_resume(req.student_id, req.lab_id).await?;
    Ok(Json(snapshot))
}

/// Current session state, including the countdown.
pub async fn current(State(engine): State<SharedEngine>) -> Result<impl IntoResponse, AppError> {
    let engine = engine.lock().await;
    Ok(Json(engine.snapshot()?))
}

/// Navigates to a question and returns it.
pub async fn question(
    State(engine): State<SharedEngine>,
    Path(index): Path<usize>,
) -> Result<impl IntoResponse, AppError> {
    let mut engine = engine.lock().await;
    let question = engine.goto(index).await?;
    Ok(Json(question))
}

/// Stores (or replaces) the answer to one question.
pub async fn answer(
    State(engine): State<SharedEngine>,
    Path(index): Path<usize>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut engine = engine.lock().await;
    engine.submit_answer(index, req.answer).await?;

    Ok(Json(serde_json::json!({
        "unanswered": engine.unanswered()?,
        "remaining_seconds": engine.remaining().unwrap_or(0),
    })))
}

/// Questions still without an answer, for the confirm-before-submit dialog.
pub async fn unanswered(State(engine): State<SharedEngine>) -> Result<impl IntoResponse, AppError> {
    let engine = engine.lock().await;
    Ok(Json(engine.unanswered()?))
}

/// Submits the test. Safe to repeat: later calls return the stored score.
pub async fn finalize(
    State(engine): State<SharedEngine>,
    Json(req): Json<FinalizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut engine = engine.lock().await;
    let score = engine.finalize(req.reason).await?;
    Ok(Json(score))
}

/// Leaves the test screen without submitting; the attempt stays open.
pub async fn close(State(engine): State<SharedEngine>) -> Result<impl IntoResponse, AppError> {
    let mut engine = engine.lock().await;
    engine.close().await?;
    Ok(StatusCode::NO_CONTENT)
}
