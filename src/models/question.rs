// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::{Validate, ValidationError};

/// Sampling bucket of a question; every lab has a quota per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Category {
    Theory,
    Practice,
    Graphic,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Theory, Category::Practice, Category::Graphic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Theory => "theory",
            Category::Practice => "practice",
            Category::Graphic => "graphic",
        }
    }
}

/// How a question is answered and graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    Numeric,
    Text,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub lab_id: i64,
    pub category: Category,
    pub kind: QuestionKind,

    /// The text content of the question.
    pub text: String,

    /// Ordered list of options, empty for numeric and text questions.
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// Option index, decimal number or expected text depending on `kind`.
    pub correct_answer: String,

    /// Accepted absolute deviation for numeric questions.
    pub tolerance: Option<f64>,

    pub image_path: Option<String>,

    /// Point weight.
    pub points: i64,
}

/// Parsed form of `Question::correct_answer`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerKey {
    Choice(usize),
    Number { value: f64, tolerance: f64 },
    Text(String),
}

impl Question {
    pub fn answer_key(&self) -> Result<AnswerKey, String> {
        parse_answer_key(self.kind, &self.correct_answer, self.tolerance, self.options.len())
    }

    /// Checks that a given answer has the shape this question expects.
    pub fn accepts(&self, value: &AnswerValue) -> Result<(), String> {
        match (self.kind, value) {
            (QuestionKind::SingleChoice, AnswerValue::Choice(index)) => {
                if *index < self.options.len() {
                    Ok(())
                } else {
                    Err(format!(
                        "option {} does not exist (question has {})",
                        index,
                        self.options.len()
                    ))
                }
            }
            (QuestionKind::Numeric, AnswerValue::Number(n)) => {
                if n.is_finite() {
                    Ok(())
                } else {
                    Err("numeric answer must be finite".to_string())
                }
            }
            (QuestionKind::Text, AnswerValue::Text(_)) => Ok(()),
            (kind, _) => Err(format!("answer does not match question kind {:?}", kind)),
        }
    }
}

fn parse_answer_key(
    kind: QuestionKind,
    raw: &str,
    tolerance: Option<f64>,
    option_count: usize,
) -> Result<AnswerKey, String> {
    match kind {
        QuestionKind::SingleChoice => {
            let index: usize = raw
                .trim()
                .parse()
                .map_err(|_| format!("choice key {:?} is not an index", raw))?;
            if index >= option_count {
                return Err(format!("choice key {} has no matching option", index));
            }
            Ok(AnswerKey::Choice(index))
        }
        QuestionKind::Numeric => {
            let value: f64 = raw
                .trim()
                .parse()
                .map_err(|_| format!("numeric key {:?} is not a number", raw))?;
            let tolerance = tolerance.unwrap_or(0.0);
            if !value.is_finite() || !tolerance.is_finite() || tolerance < 0.0 {
                return Err("numeric key or tolerance out of range".to_string());
            }
            Ok(AnswerKey::Number { value, tolerance })
        }
        QuestionKind::Text => Ok(AnswerKey::Text(raw.to_string())),
    }
}

/// A student's answer to one question.
/// Stored as tagged JSON, e.g. `{"type":"choice","value":2}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Choice(usize),
    Number(f64),
    Text(String),
}

/// DTO for sending question to client (excludes the answer key).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub category: Category,
    pub kind: QuestionKind,
    pub text: String,
    pub options: Vec<String>,
    pub image_path: Option<String>,
    pub points: i64,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            category: q.category,
            kind: q.kind,
            text: q.text.clone(),
            options: q.options.0.clone(),
            image_path: q.image_path.clone(),
            points: q.points,
        }
    }
}

/// DTO for seeding a question into a lab.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = validate_answer_key))]
pub struct NewQuestion {
    pub category: Category,
    pub kind: QuestionKind,
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[serde(default)]
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 500))]
    pub correct_answer: String,
    pub tolerance: Option<f64>,
    #[validate(length(max = 500))]
    pub image_path: Option<String>,
    #[serde(default = "default_points")]
    #[validate(range(min = 1, max = 100))]
    pub points: i64,
}

fn default_points() -> i64 {
    1
}

fn validate_options(options: &[String]) -> Result<(), ValidationError> {
    for opt in options {
        if opt.is_empty() {
            return Err(ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

fn validate_answer_key(q: &NewQuestion) -> Result<(), ValidationError> {
    if q.kind == QuestionKind::SingleChoice && q.options.len() < 2 {
        return Err(ValidationError::new("single_choice_needs_options"));
    }
    parse_answer_key(q.kind, &q.correct_answer, q.tolerance, q.options.len())
        .map(|_| ())
        .map_err(|_| ValidationError::new("answer_key_does_not_parse"))
}
