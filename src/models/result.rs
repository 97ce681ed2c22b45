// src/models/result.rs

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{FromRow, types::Json};

use super::{
    attempt::{Attempt, FinishReason},
    question::{AnswerValue, Category},
};

/// Query parameters of the instructor results listing.
#[derive(Debug, Default, Deserialize)]
pub struct ResultFilter {
    pub group: Option<String>,
    pub lab_id: Option<i64>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (start of that day).
    #[serde(default, deserialize_with = "lower_bound")]
    pub from: Option<DateTime<Utc>>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (end of that day).
    #[serde(default, deserialize_with = "upper_bound")]
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of surname or name.
    pub search: Option<String>,
}

impl ResultFilter {
    /// Unicode-aware match of `search` against a student's names.
    pub fn matches_name(&self, surname: &str, name: &str) -> bool {
        let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return true;
        };
        let needle = needle.to_lowercase();
        surname.to_lowercase().contains(&needle) || name.to_lowercase().contains(&needle)
    }
}

fn lower_bound<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    parse_bound(deserializer, NaiveTime::MIN)
}

fn upper_bound<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    parse_bound(deserializer, end_of_day)
}

fn parse_bound<'de, D: Deserializer<'de>>(
    deserializer: D,
    time_of_day: NaiveTime,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    // An unescaped `+` in a query string arrives as a space.
    let repaired = raw.replace(' ', "+");
    if let Ok(at) = DateTime::parse_from_rfc3339(&repaired) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|day| Some(day.and_time(time_of_day).and_utc()))
        .map_err(|_| serde::de::Error::custom(format!("invalid date or timestamp: {raw}")))
}

/// A finalized attempt joined with its student and lab.
#[derive(Debug, Serialize, FromRow)]
pub struct ResultEntry {
    pub attempt_id: i64,
    pub student_id: i64,
    pub surname: String,
    pub name: String,
    pub group_name: String,
    pub lab_id: i64,
    pub lab_title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub score: f64,
    pub total_points: i64,
    pub max_points: i64,
    pub finish_reason: FinishReason,
}

/// One sampled question of an attempt with what the student did on it.
#[derive(Debug, Serialize, FromRow)]
pub struct AnswerDetail {
    pub position: i64,
    pub question_id: i64,
    pub category: Category,
    pub text: String,
    pub given_answer: Option<Json<AnswerValue>>,
    pub is_correct: Option<bool>,
    pub points_earned: Option<i64>,
    pub points: i64,
    pub time_spent_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct AttemptDetails {
    pub attempt: Attempt,
    pub questions: Vec<AnswerDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn filter(query: &str) -> ResultFilter {
        serde_json::from_str(query).unwrap()
    }

    #[test]
    fn search_folds_cyrillic_case() {
        let f = filter(r#"{"search": "иванов"}"#);
        assert!(f.matches_name("Иванов", "Пётр"));
        assert!(filter(r#"{"search": "ИВАН"}"#).matches_name("Иванов", "Пётр"));
        assert!(filter(r#"{"search": "пётр"}"#).matches_name("Иванов", "Пётр"));
        assert!(!f.matches_name("Петров", "Иван"));
    }

    #[test]
    fn empty_search_matches_everyone() {
        assert!(ResultFilter::default().matches_name("Orlov", "Ivan"));
        assert!(filter(r#"{"search": "  "}"#).matches_name("Orlov", "Ivan"));
    }

    #[test]
    fn bounds_accept_dates_and_decoded_offsets() {
        let f = filter(r#"{"from": "2025-03-01", "to": "2025-03-01"}"#);
        assert_eq!(f.from, Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()));
        assert_eq!(f.to, Some(Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 59).unwrap()));

        let f = filter(r#"{"from": "2025-03-01T12:00:00 03:00"}"#);
        assert_eq!(f.from, Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));

        let bad: Result<ResultFilter, _> = serde_json::from_str(r#"{"from": "yesterday"}"#);
        assert!(bad.is_err());
    }
}
