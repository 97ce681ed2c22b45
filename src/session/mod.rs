// src/session/mod.rs

pub mod bank;
pub mod clock;
pub mod engine;
pub mod scoring;
pub mod store;
pub mod ticker;

pub use bank::QuestionBank;
pub use clock::{ManualTime, SessionClock, SystemTime, TimeSource};
pub use engine::{FinalScore, SessionEvent, SessionSnapshot, SessionState, TestSessionEngine};
pub use store::AttemptStore;
pub use ticker::{SharedEngine, spawn_ticker};
