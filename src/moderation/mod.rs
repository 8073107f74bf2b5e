//! Content moderation: link policy, blocked terms, ghost-bans and reports

pub mod guard;

pub use guard::{AbuseGuard, Verdict};
