//! Matchmaking for one-to-one chat sessions
//!
//! This module holds the waiting pool, the symmetric session table, the
//! pluggable candidate scorer and the engine that serializes find, next and
//! stop requests over them.

pub mod engine;
pub mod pool;
pub mod scorer;
pub mod sessions;

// Re-export commonly used types
pub use engine::{
    EngineStats, MatchEngine, MatchOutcome, MatchState, NextOutcome, Resolution, StopOutcome,
};
pub use pool::WaitingPool;
pub use scorer::{PreferenceScorer, Scorer};
pub use sessions::SessionTable;
