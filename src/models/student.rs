// src/models/student.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Group codes look like `ПС4-51`: two uppercase letters, course digit, dash, two digits.
pub static GROUP_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{Lu}{2}\d-\d{2}$").expect("valid group regex"));

/// Letters and dashes only, at least two characters.
pub static PERSON_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{L}[\p{L}-]*\p{L}$").expect("valid name regex"));

/// Represents the 'students' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub surname: String,
    pub name: String,
    #[serde(rename = "group")]
    pub group_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for the login screen: find the student or register them.
#[derive(Debug, Deserialize, Validate)]
pub struct StudentLoginRequest {
    #[validate(length(max = 50), regex(path = *PERSON_NAME, message = "Surname must contain letters only."))]
    pub surname: String,
    #[validate(length(max = 50), regex(path = *PERSON_NAME, message = "Name must contain letters only."))]
    pub name: String,
    #[validate(regex(path = *GROUP_CODE, message = "Group must look like ПС4-51."))]
    pub group: String,
}
