// src/session/ticker.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use super::engine::{SessionState, TestSessionEngine};

/// The single engine of this process, shared by UI actions and the ticker.
/// Holding the lock serializes answer writes against timeout finalization.
pub type SharedEngine = Arc<Mutex<TestSessionEngine>>;

pub fn shared(engine: TestSessionEngine) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Spawns the periodic countdown task.
///
/// Every period it emits a tick and finalizes the session once its clock has run out.
/// The task runs until the runtime shuts down; aborting the handle stops it.
pub fn spawn_ticker(engine: SharedEngine, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let mut engine = engine.lock().await;
            if engine.state() != SessionState::InProgress {
                continue;
            }

            match engine.tick().await {
                Ok(Some(score)) => tracing::info!(
                    "Attempt {} auto-submitted on timeout with {}%",
                    score.attempt_id,
                    score.score
                ),
                Ok(None) => {}
                Err(e) => tracing::error!("Session tick failed: {}", e),
            }
        }
    })
}
