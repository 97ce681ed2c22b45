// src/handlers/lab.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{error::AppError, session::QuestionBank};

/// Lists all labs for the lab selection screen.
pub async fn list_labs(State(bank): State<QuestionBank>) -> Result<impl IntoResponse, AppError> {
    let labs = bank.get_labs().await?;
    Ok(Json(labs))
}

/// Retrieves one lab with its quota and time budget.
pub async fn get_lab(
    State(bank): State<QuestionBank>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let lab = bank.get_lab_details(id).await?;
    Ok(Json(lab))
}
