// src/session/engine.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use super::{
    bank::QuestionBank,
    clock::{SessionClock, TimeSource},
    scoring::{self, QuestionResult, ScoreReport},
    store::AttemptStore,
};
use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        attempt::{Answer, Attempt, FinishReason},
        question::{AnswerValue, PublicQuestion, Question},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    InProgress,
    Finalized,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Tick { attempt_id: i64, remaining_seconds: i64 },
    Expired { attempt_id: i64 },
    Finalized { attempt_id: i64, score: FinalScore },
}

/// The persisted outcome of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalScore {
    pub attempt_id: i64,
    /// Percentage, one decimal.
    pub score: f64,
    pub total_points: i64,
    pub max_points: i64,
    pub reason: FinishReason,
    pub end_time: DateTime<Utc>,
    pub per_question: Vec<QuestionResult>,
}

impl FinalScore {
    fn from_report(
        attempt_id: i64,
        report: ScoreReport,
        reason: FinishReason,
        end_time: DateTime<Utc>,
    ) -> Self {
        FinalScore {
            attempt_id,
            score: report.percentage,
            total_points: report.total_points,
            max_points: report.max_points,
            reason,
            end_time,
            per_question: report.per_question,
        }
    }

    /// Rebuilds the score another writer already stored.
    fn from_persisted(attempt: &Attempt, answers: &[Answer], questions: &[Question]) -> AppResult<Self> {
        let (Some(end_time), Some(score)) = (attempt.end_time, attempt.score) else {
            return Err(AppError::Storage(format!(
                "Attempt {} reported finalized but has no stored result",
                attempt.id
            )));
        };

        let answers: HashMap<i64, &Answer> = answers.iter().map(|a| (a.question_id, a)).collect();
        let points: HashMap<i64, i64> = questions.iter().map(|q| (q.id, q.points)).collect();

        let per_question = attempt
            .question_ids
            .iter()
            .map(|id| {
                let answer = answers.get(id);
                QuestionResult {
                    question_id: *id,
                    answered: answer.is_some(),
                    is_correct: answer.and_then(|a| a.is_correct).unwrap_or(false),
                    points_earned: answer.and_then(|a| a.points_earned).unwrap_or(0),
                    max_points: points.get(id).copied().unwrap_or(0),
                }
            })
            .collect();

        Ok(FinalScore {
            attempt_id: attempt.id,
            score,
            total_points: attempt.total_points.unwrap_or(0),
            max_points: attempt.max_points.unwrap_or(0),
            reason: attempt.finish_reason.unwrap_or(FinishReason::Manual),
            end_time,
            per_question,
        })
    }
}

/// What the UI needs to render the test screen.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub attempt_id: i64,
    pub student_id: i64,
    pub lab_id: i64,
    pub state: SessionState,
    /// True when an already open attempt was picked up instead of a new one.
    pub resumed: bool,
    pub current_index: usize,
    pub question_count: usize,
    pub remaining_seconds: i64,
    pub deadline: DateTime<Utc>,
    pub questions: Vec<PublicQuestion>,
    /// Aligned with `questions`.
    pub answers: Vec<Option<AnswerValue>>,
    pub unanswered: Vec<usize>,
    pub result: Option<FinalScore>,
}

struct ActiveSession {
    attempt: Attempt,
    questions: Vec<Question>,
    answers: HashMap<i64, AnswerValue>,
    current_index: usize,
    clock: SessionClock,
    /// When the student landed on `current_index`.
    viewing_since: DateTime<Utc>,
    resumed: bool,
    result: Option<FinalScore>,
}

impl ActiveSession {
    fn state(&self) -> SessionState {
        match self.result {
            Some(_) => SessionState::Finalized,
            None => SessionState::InProgress,
        }
    }

    fn unanswered(&self) -> Vec<usize> {
        self.questions
            .iter()
            .enumerate()
            .filter(|(_, q)| !self.answers.contains_key(&q.id))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Drives one student's test: start or resume, answer, navigate, finalize.
///
/// Holds at most one session. Callers share it behind a single mutex
/// (see [`super::ticker::SharedEngine`]) so the expiry ticker and UI actions never interleave.
pub struct TestSessionEngine {
    bank: QuestionBank,
    store: AttemptStore,
    time: Arc<dyn TimeSource>,
    default_duration_minutes: i64,
    events: broadcast::Sender<SessionEvent>,
    session: Option<ActiveSession>,
}

impl TestSessionEngine {
    pub fn new(pool: SqlitePool, config: &Config, time: Arc<dyn TimeSource>) -> Self {
        let (events, _) = broadcast::channel(64);
        TestSessionEngine {
            bank: QuestionBank::new(pool.clone()),
            store: AttemptStore::new(pool, time.clone()),
            time,
            default_duration_minutes: config.test_duration_minutes,
            events,
            session: None,
        }
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn store(&self) -> &AttemptStore {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::NotStarted, ActiveSession::state)
    }

    pub fn attempt_id(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.attempt.id)
    }

    /// Seconds left on the clock, `None` without a session.
    pub fn remaining(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.clock.remaining())
    }

    pub fn is_expired(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.clock.is_expired())
    }

    /// Resumes the open attempt for the pair if there is one, otherwise samples a new paper.
    ///
    /// An open attempt is never discarded or re-sampled. Its clock keeps running
    /// from the original start, and one whose time ran out while the app was
    /// closed is finalized on the spot.
    pub async fn start_or_resume(&mut self, student_id: i64, lab_id: i64) -> AppResult<SessionSnapshot> {
        let already_open = self.session.as_ref().is_some_and(|s| {
            s.attempt.student_id == student_id && s.attempt.lab_id == lab_id && s.result.is_none()
        });
        if already_open {
            self.check_expiry().await?;
            return self.snapshot();
        }

        let lab = self.bank.get_lab_details(lab_id).await?;

        let (attempt, questions, resumed) = match self.store.find_open_attempt(student_id, lab_id).await? {
            Some(open) => {
                let questions = self.bank.get_questions(&open.question_ids).await?;
                (open, questions, true)
            }
            None => {
                let questions = self.bank.sample_questions(lab_id).await?;
                let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();

                match self.store.start_attempt(student_id, lab_id, &ids).await {
                    Ok(attempt) => (attempt, questions, false),
                    Err(AppError::Conflict(msg)) => {
                        // Lost a race with another writer; take over its attempt.
                        tracing::warn!("{}; resuming instead", msg);
                        let open = self
                            .store
                            .find_open_attempt(student_id, lab_id)
                            .await?
                            .ok_or(AppError::Conflict(msg))?;
                        let questions = self.bank.get_questions(&open.question_ids).await?;
                        (open, questions, true)
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let answers = if resumed {
            self.store
                .get_answers(attempt.id)
                .await?
                .into_iter()
                .map(|a| (a.question_id, a.given_answer.0))
                .collect()
        } else {
            HashMap::new()
        };

        let minutes = lab.duration_minutes.unwrap_or(self.default_duration_minutes);
        let clock = SessionClock::new(attempt.start_time, TimeDelta::minutes(minutes), self.time.clone());

        if resumed {
            tracing::info!(
                "Resumed attempt {} for student {} on lab {} ({}s left, {} answered)",
                attempt.id,
                student_id,
                lab_id,
                clock.remaining(),
                answers.len()
            );
        }

        // Book the time of a session being replaced before it is dropped.
        self.close().await?;

        let expired = clock.is_expired();
        self.session = Some(ActiveSession {
            viewing_since: clock.now(),
            attempt,
            questions,
            answers,
            current_index: 0,
            clock,
            resumed,
            result: None,
        });

        if expired {
            self.check_expiry().await?;
        }

        self.snapshot()
    }

    /// Records an answer for the question at `question_index`; re-answering overwrites.
    pub async fn submit_answer(&mut self, question_index: usize, value: AnswerValue) -> AppResult<()> {
        let session = active(&mut self.session)?;

        if session.result.is_some() {
            return Err(AppError::InvalidState(format!(
                "Attempt {} is finalized",
                session.attempt.id
            )));
        }
        if session.clock.is_expired() {
            return Err(AppError::Expired(format!(
                "Time for attempt {} ran out at {}",
                session.attempt.id,
                session.clock.deadline()
            )));
        }

        let question = session.questions.get(question_index).ok_or(AppError::OutOfRange {
            index: question_index,
            len: session.questions.len(),
        })?;
        question.accepts(&value).map_err(AppError::BadRequest)?;

        let question_id = question.id;
        self.store
            .upsert_answer(session.attempt.id, question_id, &value)
            .await?;
        session.answers.insert(question_id, value);
        Ok(())
    }

    /// Moves to another question. Only bookkeeping changes; answers are untouched.
    pub async fn goto(&mut self, question_index: usize) -> AppResult<PublicQuestion> {
        let session = active(&mut self.session)?;

        let len = session.questions.len();
        if question_index >= len {
            return Err(AppError::OutOfRange {
                index: question_index,
                len,
            });
        }

        let now = session.clock.now();
        if session.result.is_none() && !session.clock.is_expired() {
            flush_time_spent(&self.store, session, now).await?;
        }

        session.current_index = question_index;
        session.viewing_since = now;
        Ok(PublicQuestion::from(&session.questions[question_index]))
    }

    pub fn current_question(&self) -> AppResult<PublicQuestion> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| AppError::InvalidState("No test session".to_string()))?;
        session
            .questions
            .get(session.current_index)
            .map(PublicQuestion::from)
            .ok_or(AppError::OutOfRange {
                index: session.current_index,
                len: session.questions.len(),
            })
    }

    /// Indices of sampled questions without an answer. Advisory only.
    pub fn unanswered(&self) -> AppResult<Vec<usize>> {
        self.session
            .as_ref()
            .map(ActiveSession::unanswered)
            .ok_or_else(|| AppError::InvalidState("No test session".to_string()))
    }

    /// Closes the attempt and returns its score, exactly once.
    ///
    /// Repeating the call is a no-op returning the same score, whether the first
    /// finalize happened here or in another engine instance. A submit that
    /// arrives after the deadline is recorded as a timeout.
    pub async fn finalize(&mut self, reason: FinishReason) -> AppResult<FinalScore> {
        let session = active(&mut self.session)?;

        if let Some(result) = &session.result {
            tracing::debug!("Attempt {} already finalized here", session.attempt.id);
            return Ok(result.clone());
        }

        let attempt_id = session.attempt.id;
        let end_time = session.clock.now().min(session.clock.deadline());
        let reason = if session.clock.is_expired() {
            FinishReason::Timeout
        } else {
            reason
        };

        if let Err(e) = flush_time_spent(&self.store, session, end_time).await {
            match e {
                AppError::InvalidState(_) => {}
                other => return Err(other),
            }
        }

        let answers = self.store.get_answers(attempt_id).await?;
        let report = scoring::score(&session.attempt, &answers, &session.questions);

        let outcome = self.store.finalize(attempt_id, &report, end_time, reason).await;
        let result = match outcome {
            Ok(()) => FinalScore::from_report(attempt_id, report, reason, end_time),
            Err(AppError::InvalidState(msg)) => {
                tracing::warn!("{}; returning the stored score", msg);
                let attempt = self.store.get_attempt(attempt_id).await?;
                let answers = self.store.get_answers(attempt_id).await?;
                FinalScore::from_persisted(&attempt, &answers, &session.questions)?
            }
            Err(e) => return Err(e),
        };

        session.attempt.end_time = Some(result.end_time);
        session.attempt.score = Some(result.score);
        session.attempt.total_points = Some(result.total_points);
        session.attempt.max_points = Some(result.max_points);
        session.attempt.finish_reason = Some(result.reason);
        session.result = Some(result.clone());

        let _ = self.events.send(SessionEvent::Finalized {
            attempt_id,
            score: result.clone(),
        });
        Ok(result)
    }

    /// Forces a timeout finalize once the clock has run out.
    pub async fn check_expiry(&mut self) -> AppResult<Option<FinalScore>> {
        let attempt_id = match &self.session {
            Some(s) if s.result.is_none() && s.clock.is_expired() => s.attempt.id,
            _ => return Ok(None),
        };

        tracing::info!("Time is up for attempt {}", attempt_id);
        let _ = self.events.send(SessionEvent::Expired { attempt_id });
        self.finalize(FinishReason::Timeout).await.map(Some)
    }

    /// One timer period: report the countdown, then enforce expiry.
    pub async fn tick(&mut self) -> AppResult<Option<FinalScore>> {
        if let Some(s) = &self.session {
            if s.result.is_none() {
                let _ = self.events.send(SessionEvent::Tick {
                    attempt_id: s.attempt.id,
                    remaining_seconds: s.clock.remaining(),
                });
            }
        }
        self.check_expiry().await
    }

    /// Drops the in-memory session without finalizing; the attempt stays open for resume.
    pub async fn close(&mut self) -> AppResult<()> {
        if let Some(session) = self.session.as_mut() {
            if session.result.is_none() && !session.clock.is_expired() {
                let now = session.clock.now();
                if let Err(e) = flush_time_spent(&self.store, session, now).await {
                    tracing::warn!("Could not record time for attempt {}: {}", session.attempt.id, e);
                }
            }
            tracing::info!("Closed session for attempt {}", session.attempt.id);
        }
        self.session = None;
        Ok(())
    }

    pub fn snapshot(&self) -> AppResult<SessionSnapshot> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| AppError::InvalidState("No test session".to_string()))?;

        Ok(SessionSnapshot {
            attempt_id: session.attempt.id,
            student_id: session.attempt.student_id,
            lab_id: session.attempt.lab_id,
            state: session.state(),
            resumed: session.resumed,
            current_index: session.current_index,
            question_count: session.questions.len(),
            remaining_seconds: session.clock.remaining(),
            deadline: session.clock.deadline(),
            questions: session.questions.iter().map(PublicQuestion::from).collect(),
            answers: session
                .questions
                .iter()
                .map(|q| session.answers.get(&q.id).cloned())
                .collect(),
            unanswered: session.unanswered(),
            result: session.result.clone(),
        })
    }
}

fn active(session: &mut Option<ActiveSession>) -> AppResult<&mut ActiveSession> {
    session
        .as_mut()
        .ok_or_else(|| AppError::InvalidState("No test session".to_string()))
}

/// Books the time since `viewing_since` against the current question.
async fn flush_time_spent(
    store: &AttemptStore,
    session: &mut ActiveSession,
    until: DateTime<Utc>,
) -> AppResult<()> {
    let seconds = (until - session.viewing_since).num_seconds();
    session.viewing_since = until;
    if seconds <= 0 {
        return Ok(());
    }

    let Some(question) = session.questions.get(session.current_index) else {
        return Ok(());
    };
    let question_id = question.id;
    store
        .record_time_spent(session.attempt.id, question_id, seconds)
        .await
}
