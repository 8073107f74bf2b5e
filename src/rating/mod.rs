//! Partner ratings
//!
//! Ending a session with stop lets both former partners rate each other once
//! on a 1..=5 scale. Scores accumulate into the ratee's stored sum and count.

pub mod pending;
pub mod service;

// Re-export commonly used types
pub use pending::PendingRatings;
pub use service::{RatingReceipt, RatingService, RatingSummary};
