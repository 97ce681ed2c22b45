// src/session/scoring.rs

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{
    attempt::{Answer, Attempt},
    question::{AnswerKey, AnswerValue, Question},
};

/// Outcome for one sampled question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    pub question_id: i64,
    pub answered: bool,
    pub is_correct: bool,
    pub points_earned: i64,
    pub max_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    pub total_points: i64,
    pub max_points: i64,
    /// 100 * total / max, rounded to one decimal.
    pub percentage: f64,
    /// In the attempt's question order.
    pub per_question: Vec<QuestionResult>,
}

/// Scores an attempt against the bank's answer keys.
///
/// Walks the attempt's sampled question ids in order. A question without an
/// answer row earns 0 points. Answers to questions outside the sampled set are ignored.
pub fn score(attempt: &Attempt, answers: &[Answer], questions: &[Question]) -> ScoreReport {
    let by_id: HashMap<i64, &Question> = questions.iter().map(|q| (q.id, q)).collect();
    let given: HashMap<i64, &AnswerValue> = answers
        .iter()
        .filter(|a| a.attempt_id == attempt.id)
        .map(|a| (a.question_id, &a.given_answer.0))
        .collect();

    let mut total_points = 0;
    let mut max_points = 0;
    let mut per_question = Vec::with_capacity(attempt.question_ids.len());

    for question_id in &attempt.question_ids {
        let Some(question) = by_id.get(question_id) else {
            tracing::warn!(
                "Attempt {} references question {} missing from the scoring set",
                attempt.id,
                question_id
            );
            continue;
        };

        let answer = given.get(question_id).copied();
        let is_correct = answer.is_some_and(|value| grade(question, value));
        let points_earned = if is_correct { question.points } else { 0 };

        total_points += points_earned;
        max_points += question.points;
        per_question.push(QuestionResult {
            question_id: question.id,
            answered: answer.is_some(),
            is_correct,
            points_earned,
            max_points: question.points,
        });
    }

    ScoreReport {
        total_points,
        max_points,
        percentage: percentage(total_points, max_points),
        per_question,
    }
}

/// Grades one answer. Shape mismatches and broken keys count as incorrect.
pub fn grade(question: &Question, value: &AnswerValue) -> bool {
    let key = match question.answer_key() {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!("Question {} has a malformed answer key: {}", question.id, e);
            return false;
        }
    };

    match (key, value) {
        (AnswerKey::Choice(correct), AnswerValue::Choice(given)) => correct == *given,
        (AnswerKey::Number { value, tolerance }, AnswerValue::Number(given)) => {
            given.is_finite() && (given - value).abs() <= tolerance
        }
        (AnswerKey::Text(expected), AnswerValue::Text(given)) => {
            expected.trim().to_lowercase() == given.trim().to_lowercase()
        }
        _ => false,
    }
}

pub fn percentage(total_points: i64, max_points: i64) -> f64 {
    if max_points <= 0 {
        return 0.0;
    }
    let raw = 100.0 * total_points as f64 / max_points as f64;
    (raw * 10.0).round() / 10.0
}
