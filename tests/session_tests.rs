// tests/session_tests.rs

mod common;

use std::time::Duration;

use chrono::TimeDelta;
use labtest::{
    error::AppError,
    models::{attempt::FinishReason, question::AnswerValue},
    session::{self, QuestionBank, SessionEvent, SessionState},
};
use tokio::time::timeout;

async fn prepared() -> (sqlx::SqlitePool, i64, i64) {
    let pool = common::setup_pool().await;
    let bank = QuestionBank::new(pool.clone());
    let lab_id = common::seed_lab(&bank, 4, 4, 2).await;
    let student_id = common::insert_student(&pool, "Sidorov").await;
    (pool, student_id, lab_id)
}

#[tokio::test]
async fn fresh_start_samples_a_full_paper() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    assert_eq!(engine.state(), SessionState::NotStarted);

    let snap = engine.start_or_resume(student_id, lab_id).await.unwrap();

    assert_eq!(engine.state(), SessionState::InProgress);
    assert!(!snap.resumed);
    assert_eq!(snap.question_count, 5);
    assert_eq!(snap.remaining_seconds, 1200);
    assert_eq!(snap.deadline, common::t0() + TimeDelta::minutes(20));
    assert_eq!(snap.unanswered, vec![0, 1, 2, 3, 4]);
    assert!(snap.answers.iter().all(Option::is_none));
}

#[tokio::test]
async fn repeated_start_returns_the_same_attempt() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();

    let mut engine = common::engine(&pool, &time);
    let first = engine.start_or_resume(student_id, lab_id).await.unwrap();
    let again = engine.start_or_resume(student_id, lab_id).await.unwrap();
    assert_eq!(again.attempt_id, first.attempt_id);

    // A new engine (app restart) resumes rather than re-sampling.
    let mut restarted = common::engine(&pool, &time);
    let resumed = restarted.start_or_resume(student_id, lab_id).await.unwrap();
    assert_eq!(resumed.attempt_id, first.attempt_id);
    assert!(resumed.resumed);
    let ids = |s: &session::SessionSnapshot| s.questions.iter().map(|q| q.id).collect::<Vec<_>>();
    assert_eq!(ids(&resumed), ids(&first));
}

#[tokio::test]
async fn answers_overwrite_and_survive_resume() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();

    let mut engine = common::engine(&pool, &time);
    engine.start_or_resume(student_id, lab_id).await.unwrap();
    engine.submit_answer(0, AnswerValue::Choice(0)).await.unwrap();
    engine.submit_answer(1, AnswerValue::Choice(1)).await.unwrap();
    engine.submit_answer(1, AnswerValue::Choice(2)).await.unwrap();
    engine.close().await.unwrap();
    assert_eq!(engine.state(), SessionState::NotStarted);

    let mut engine = common::engine(&pool, &time);
    let snap = engine.start_or_resume(student_id, lab_id).await.unwrap();
    assert_eq!(snap.answers[0], Some(AnswerValue::Choice(0)));
    assert_eq!(snap.answers[1], Some(AnswerValue::Choice(2)));
    assert_eq!(snap.unanswered, vec![2, 3, 4]);

    let score = engine.finalize(FinishReason::Manual).await.unwrap();
    assert_eq!(score.total_points, 1);
    assert_eq!(score.max_points, 5);
    assert_eq!(score.score, 20.0);
    assert!(score.per_question[0].is_correct);
    assert!(!score.per_question[1].is_correct);
    assert!(score.per_question[1].answered);
    assert!(!score.per_question[2].answered);
}

#[tokio::test]
async fn finalize_is_idempotent_on_one_engine() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    engine.start_or_resume(student_id, lab_id).await.unwrap();
    engine.submit_answer(2, AnswerValue::Choice(0)).await.unwrap();

    time.advance(90);
    let first = engine.finalize(FinishReason::Manual).await.unwrap();
    time.advance(30);
    let second = engine.finalize(FinishReason::Manual).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.end_time, common::t0() + TimeDelta::seconds(90));
    assert_eq!(engine.state(), SessionState::Finalized);

    let err = engine.submit_answer(0, AnswerValue::Choice(0)).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn finalize_from_two_engines_keeps_the_first_result() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();

    let mut a = common::engine(&pool, &time);
    let mut b = common::engine(&pool, &time);
    a.start_or_resume(student_id, lab_id).await.unwrap();
    b.start_or_resume(student_id, lab_id).await.unwrap();
    a.submit_answer(0, AnswerValue::Choice(0)).await.unwrap();

    time.advance(100);
    let first = a.finalize(FinishReason::Manual).await.unwrap();
    time.advance(100);
    let second = b.finalize(FinishReason::Manual).await.unwrap();

    assert_eq!(second.end_time, first.end_time);
    assert_eq!(second.score, first.score);
    assert_eq!(second.total_points, 1);
    assert_eq!(second.reason, FinishReason::Manual);

    let attempt = a.store().get_attempt(first.attempt_id).await.unwrap();
    assert_eq!(attempt.end_time, Some(first.end_time));
}

#[tokio::test]
async fn clock_keeps_running_across_resume() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();

    let mut engine = common::engine(&pool, &time);
    engine.start_or_resume(student_id, lab_id).await.unwrap();
    time.advance(300);
    engine.close().await.unwrap();

    // Closed for a while; the budget is not refunded.
    time.advance(200);
    let mut engine = common::engine(&pool, &time);
    let snap = engine.start_or_resume(student_id, lab_id).await.unwrap();
    assert_eq!(snap.remaining_seconds, 700);
    assert_eq!(engine.remaining(), Some(700));
}

#[tokio::test]
async fn answers_after_the_deadline_are_refused() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    engine.start_or_resume(student_id, lab_id).await.unwrap();

    time.advance(1205);
    assert!(engine.is_expired());
    assert_eq!(engine.remaining(), Some(0));

    let err = engine.submit_answer(0, AnswerValue::Choice(0)).await.unwrap_err();
    assert!(matches!(err, AppError::Expired(_)));
}

#[tokio::test]
async fn tick_finalizes_on_timeout_at_the_deadline() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    let mut events = engine.subscribe();
    let snap = engine.start_or_resume(student_id, lab_id).await.unwrap();

    time.advance(600);
    assert!(engine.tick().await.unwrap().is_none());

    time.advance(605);
    let score = engine.tick().await.unwrap().expect("tick should finalize");
    assert_eq!(score.reason, FinishReason::Timeout);
    assert_eq!(score.end_time, snap.deadline);
    assert_eq!(engine.state(), SessionState::Finalized);

    // Tick(600 left), Tick(0 left), Expired, Finalized.
    match events.recv().await.unwrap() {
        SessionEvent::Tick { remaining_seconds, .. } => assert_eq!(remaining_seconds, 600),
        other => panic!("unexpected event {:?}", other),
    }
    match events.recv().await.unwrap() {
        SessionEvent::Tick { remaining_seconds, .. } => assert_eq!(remaining_seconds, 0),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Expired { .. }));
    match events.recv().await.unwrap() {
        SessionEvent::Finalized { score: s, .. } => assert_eq!(s, score),
        other => panic!("unexpected event {:?}", other),
    }

    // Finalized sessions stay quiet.
    assert!(engine.tick().await.unwrap().is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn resuming_an_expired_attempt_finalizes_it() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();

    let mut engine = common::engine(&pool, &time);
    let first = engine.start_or_resume(student_id, lab_id).await.unwrap();
    engine.submit_answer(0, AnswerValue::Choice(0)).await.unwrap();
    engine.close().await.unwrap();

    time.advance(3600);
    let mut engine = common::engine(&pool, &time);
    let snap = engine.start_or_resume(student_id, lab_id).await.unwrap();

    assert_eq!(snap.attempt_id, first.attempt_id);
    assert_eq!(snap.state, SessionState::Finalized);
    let result = snap.result.expect("expired attempt should carry its result");
    assert_eq!(result.reason, FinishReason::Timeout);
    assert_eq!(result.end_time, first.deadline);
    assert_eq!(result.total_points, 1);

    // The next start opens a fresh attempt.
    let mut engine = common::engine(&pool, &time);
    let next = engine.start_or_resume(student_id, lab_id).await.unwrap();
    assert_ne!(next.attempt_id, first.attempt_id);
    assert!(!next.resumed);
}

#[tokio::test]
async fn navigation_is_bounded_and_records_time() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    let snap = engine.start_or_resume(student_id, lab_id).await.unwrap();

    time.advance(40);
    let q = engine.goto(3).await.unwrap();
    assert_eq!(q.id, snap.questions[3].id);
    assert_eq!(engine.current_question().unwrap().id, q.id);

    let err = engine.goto(5).await.unwrap_err();
    assert!(matches!(err, AppError::OutOfRange { index: 5, len: 5 }));
    let err = engine.submit_answer(7, AnswerValue::Choice(0)).await.unwrap_err();
    assert!(matches!(err, AppError::OutOfRange { index: 7, len: 5 }));

    time.advance(25);
    engine.goto(0).await.unwrap();

    let spent: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT question_id, seconds FROM question_time WHERE attempt_id = ? ORDER BY seconds",
    )
    .bind(snap.attempt_id)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        spent,
        vec![(snap.questions[3].id, 25), (snap.questions[0].id, 40)]
    );
}

#[tokio::test]
async fn empty_finalize_scores_zero() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    engine.start_or_resume(student_id, lab_id).await.unwrap();

    assert_eq!(engine.unanswered().unwrap(), vec![0, 1, 2, 3, 4]);
    let score = engine.finalize(FinishReason::Manual).await.unwrap();
    assert_eq!(score.score, 0.0);
    assert_eq!(score.total_points, 0);
    assert_eq!(score.max_points, 5);
    assert!(score.per_question.iter().all(|q| !q.answered));
}

#[tokio::test]
async fn wrong_answer_shape_is_a_bad_request() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    engine.start_or_resume(student_id, lab_id).await.unwrap();

    let err = engine
        .submit_answer(0, AnswerValue::Text("Ohm".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = engine.submit_answer(0, AnswerValue::Choice(9)).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(engine.unanswered().unwrap().len(), 5);
}

#[tokio::test]
async fn operations_without_a_session_are_invalid() {
    let (pool, _, _) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);

    assert!(matches!(
        engine.submit_answer(0, AnswerValue::Choice(0)).await,
        Err(AppError::InvalidState(_))
    ));
    assert!(matches!(engine.finalize(FinishReason::Manual).await, Err(AppError::InvalidState(_))));
    assert!(matches!(engine.snapshot(), Err(AppError::InvalidState(_))));
    assert!(engine.tick().await.unwrap().is_none());
}

#[tokio::test]
async fn start_reports_missing_lab_and_short_pool() {
    let (pool, student_id, _) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);

    assert!(matches!(
        engine.start_or_resume(student_id, 999).await,
        Err(AppError::NotFound(_))
    ));

    let bank = QuestionBank::new(pool.clone());
    let thin = common::seed_lab(&bank, 2, 2, 0).await;
    assert!(matches!(
        engine.start_or_resume(student_id, thin).await,
        Err(AppError::InsufficientQuestions { .. })
    ));
    assert_eq!(engine.state(), SessionState::NotStarted);
}

#[tokio::test]
async fn ticker_task_submits_on_timeout() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    let mut events = engine.subscribe();
    engine.start_or_resume(student_id, lab_id).await.unwrap();

    let shared = session::ticker::shared(engine);
    let handle = session::spawn_ticker(shared.clone(), Duration::from_millis(10));

    time.advance(1200);
    let finalized = timeout(Duration::from_secs(5), async {
        loop {
            if let SessionEvent::Finalized { score, .. } = events.recv().await.unwrap() {
                return score;
            }
        }
    })
    .await
    .expect("ticker did not finalize in time");
    handle.abort();

    assert_eq!(finalized.reason, FinishReason::Timeout);
    assert_eq!(shared.lock().await.state(), SessionState::Finalized);
}

#[tokio::test]
async fn restarting_an_expired_session_on_the_same_engine_finalizes_it() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    let first = engine.start_or_resume(student_id, lab_id).await.unwrap();

    time.advance(1205);
    let snap = engine.start_or_resume(student_id, lab_id).await.unwrap();

    assert_eq!(snap.attempt_id, first.attempt_id);
    assert_eq!(snap.state, SessionState::Finalized);
    let result = snap.result.expect("expired attempt should carry its result");
    assert_eq!(result.reason, FinishReason::Timeout);
    assert_eq!(result.end_time, first.deadline);
}

#[tokio::test]
async fn switching_labs_books_time_on_the_left_question() {
    let (pool, student_id, lab_id) = prepared().await;
    let bank = QuestionBank::new(pool.clone());
    let other_lab = common::seed_lab(&bank, 2, 2, 1).await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);

    let first = engine.start_or_resume(student_id, lab_id).await.unwrap();
    time.advance(50);
    let second = engine.start_or_resume(student_id, other_lab).await.unwrap();
    assert_ne!(second.attempt_id, first.attempt_id);

    let seconds: i64 =
        sqlx::query_scalar("SELECT seconds FROM question_time WHERE attempt_id = ? AND question_id = ?")
            .bind(first.attempt_id)
            .bind(first.questions[0].id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(seconds, 50);

    // The left attempt stays open for a later resume.
    let open = engine.store().find_open_attempt(student_id, lab_id).await.unwrap();
    assert_eq!(open.map(|a| a.id), Some(first.attempt_id));
}

#[tokio::test]
async fn late_manual_submit_is_recorded_as_timeout() {
    let (pool, student_id, lab_id) = prepared().await;
    let time = common::manual_time();
    let mut engine = common::engine(&pool, &time);
    let snap = engine.start_or_resume(student_id, lab_id).await.unwrap();

    time.advance(1300);
    let score = engine.finalize(FinishReason::Manual).await.unwrap();
    assert_eq!(score.reason, FinishReason::Timeout);
    assert_eq!(score.end_time, snap.deadline);

    let attempt = engine.store().get_attempt(snap.attempt_id).await.unwrap();
    assert_eq!(attempt.finish_reason, Some(FinishReason::Timeout));
}
