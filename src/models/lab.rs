// src/models/lab.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::question::{Category, NewQuestion};

/// Per-category number of questions drawn for one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Quota {
    pub theory_count: i64,
    pub practice_count: i64,
    pub graphic_count: i64,
}

impl Quota {
    pub fn for_category(&self, category: Category) -> i64 {
        match category {
            Category::Theory => self.theory_count,
            Category::Practice => self.practice_count,
            Category::Graphic => self.graphic_count,
        }
    }

    pub fn total(&self) -> i64 {
        self.theory_count + self.practice_count + self.graphic_count
    }
}

/// Represents the 'labs' table in the database.
/// Immutable reference data once seeded.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lab {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,

    #[sqlx(flatten)]
    pub quota: Quota,

    /// Overrides the global test duration when set.
    pub duration_minutes: Option<i64>,
}

/// Seeding DTO for a lab together with its question pool.
#[derive(Debug, Deserialize, Validate)]
pub struct NewLab {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(custom(function = validate_quota))]
    pub quota: Option<Quota>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: Option<i64>,
    #[validate(nested)]
    #[serde(default)]
    pub questions: Vec<NewQuestion>,
}

/// Top-level shape of a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub labs: Vec<NewLab>,
}

fn validate_quota(quota: &Quota) -> Result<(), validator::ValidationError> {
    if quota.theory_count < 0 || quota.practice_count < 0 || quota.graphic_count < 0 {
        return Err(validator::ValidationError::new("quota_cannot_be_negative"));
    }
    if quota.total() == 0 {
        return Err(validator::ValidationError::new("quota_cannot_be_empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_total_and_lookup() {
        let quota = Quota {
            theory_count: 2,
            practice_count: 2,
            graphic_count: 1,
        };
        assert_eq!(quota.total(), 5);
        assert_eq!(quota.for_category(Category::Graphic), 1);
    }

    #[test]
    fn empty_quota_is_rejected() {
        let lab = NewLab {
            title: "Lab".to_string(),
            description: None,
            quota: Some(Quota {
                theory_count: 0,
                practice_count: 0,
                graphic_count: 0,
            }),
            duration_minutes: None,
            questions: vec![],
        };
        assert!(lab.validate().is_err());
    }
}
