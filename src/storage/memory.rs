//! In-memory profile store
//!
//! Backs tests and dry runs. Can be switched into an "unavailable" state to
//! exercise storage failure paths.

use super::{ProfileStore, ProfileUpdate, StoreStats};
use crate::error::{ChatError, Result};
use crate::types::{AbuseReport, ChatLogEntry, UserId, UserProfile};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// In-memory profile storage implementation
#[derive(Debug, Default)]
pub struct InMemoryStore {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
    logs: RwLock<Vec<ChatLogEntry>>,
    reports: RwLock<Vec<AbuseReport>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a storage error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert or replace a whole profile
    pub fn seed_profile(&self, profile: UserProfile) -> Result<()> {
        let mut profiles = self.profiles_write()?;
        profiles.insert(profile.user_id, profile);
        Ok(())
    }

    /// All stored chat lines in append order
    pub fn logs(&self) -> Result<Vec<ChatLogEntry>> {
        let logs = self.logs.read().map_err(|_| ChatError::InternalError {
            message: "Failed to acquire logs read lock".to_string(),
        })?;
        Ok(logs.clone())
    }

    /// All stored reports in append order
    pub fn reports(&self) -> Result<Vec<AbuseReport>> {
        let reports = self.reports.read().map_err(|_| ChatError::InternalError {
            message: "Failed to acquire reports read lock".to_string(),
        })?;
        Ok(reports.clone())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ChatError::Storage {
                message: "store unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn profiles_write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<UserId, UserProfile>>> {
        self.profiles.write().map_err(|_| {
            ChatError::InternalError {
                message: "Failed to acquire profiles write lock".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        self.check_available()?;
        let profiles = self.profiles.read().map_err(|_| ChatError::InternalError {
            message: "Failed to acquire profiles read lock".to_string(),
        })?;
        Ok(profiles.get(&user_id).cloned())
    }

    async fn ensure_profile(&self, user_id: UserId) -> Result<UserProfile> {
        self.check_available()?;
        let mut profiles = self.profiles_write()?;
        Ok(profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::new(user_id))
            .clone())
    }

    async fn upsert_profile(&self, user_id: UserId, update: ProfileUpdate) -> Result<UserProfile> {
        self.check_available()?;
        let mut profiles = self.profiles_write()?;
        let profile = profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::new(user_id));
        update.apply(profile);
        Ok(profile.clone())
    }

    async fn record_rating(&self, ratee: UserId, score: i64) -> Result<UserProfile> {
        self.check_available()?;
        let mut profiles = self.profiles_write()?;
        let profile = profiles
            .entry(ratee)
            .or_insert_with(|| UserProfile::new(ratee));
        profile.rating_sum += score;
        profile.rating_count += 1;
        Ok(profile.clone())
    }

    async fn append_log(&self, entry: &ChatLogEntry) -> Result<()> {
        self.check_available()?;
        let mut logs = self.logs.write().map_err(|_| ChatError::InternalError {
            message: "Failed to acquire logs write lock".to_string(),
        })?;
        logs.push(entry.clone());
        Ok(())
    }

    async fn append_report(&self, report: &AbuseReport) -> Result<i64> {
        self.check_available()?;
        let mut reports = self.reports.write().map_err(|_| ChatError::InternalError {
            message: "Failed to acquire reports write lock".to_string(),
        })?;
        reports.push(report.clone());
        Ok(reports.len() as i64)
    }

    async fn recent_logs(&self, user_id: UserId, limit: usize) -> Result<Vec<ChatLogEntry>> {
        self.check_available()?;
        let logs = self.logs()?;
        let mut recent: Vec<ChatLogEntry> = logs
            .into_iter()
            .rev()
            .filter(|entry| entry.user_id == user_id || entry.partner_id == user_id)
            .take(limit)
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn report_count(&self, reported: UserId) -> Result<u64> {
        self.check_available()?;
        Ok(self
            .reports()?
            .iter()
            .filter(|report| report.reported == reported)
            .count() as u64)
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.check_available()?;
        let (users, premium_users) = {
            let profiles = self.profiles.read().map_err(|_| ChatError::InternalError {
                message: "Failed to acquire profiles read lock".to_string(),
            })?;
            (
                profiles.len() as u64,
                profiles.values().filter(|p| p.is_premium).count() as u64,
            )
        };

        Ok(StoreStats {
            users,
            premium_users,
            reports: self.reports()?.len() as u64,
            chat_lines: self.logs()?.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gender;

    #[tokio::test]
    async fn test_ensure_profile_creates_defaults_once() {
        let store = InMemoryStore::new();
        let profile = store.ensure_profile(5).await.unwrap();
        assert_eq!(profile, UserProfile::new(5));

        store
            .upsert_profile(5, ProfileUpdate::Premium(true))
            .await
            .unwrap();
        let again = store.ensure_profile(5).await.unwrap();
        assert!(again.is_premium);
    }

    #[tokio::test]
    async fn test_single_field_updates_do_not_clobber() {
        let store = InMemoryStore::new();
        store
            .upsert_profile(1, ProfileUpdate::Gender(Some(Gender::Female)))
            .await
            .unwrap();
        store.record_rating(1, 4).await.unwrap();
        let profile = store
            .upsert_profile(1, ProfileUpdate::GhostBanUntil(99))
            .await
            .unwrap();

        assert_eq!(profile.gender, Some(Gender::Female));
        assert_eq!(profile.rating_sum, 4);
        assert_eq!(profile.rating_count, 1);
        assert_eq!(profile.ghost_ban_until, 99);
    }

    #[tokio::test]
    async fn test_recent_logs_filters_and_orders() {
        let store = InMemoryStore::new();
        store.append_log(&ChatLogEntry::text(1, 2, 10, "a")).await.unwrap();
        store.append_log(&ChatLogEntry::text(3, 4, 11, "b")).await.unwrap();
        store.append_log(&ChatLogEntry::text(2, 1, 12, "c")).await.unwrap();
        store.append_log(&ChatLogEntry::text(1, 2, 13, "d")).await.unwrap();

        let recent = store.recent_logs(1, 2).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        let err = store.ensure_profile(1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatError>(),
            Some(ChatError::Storage { .. })
        ));

        store.set_unavailable(false);
        assert!(store.ensure_profile(1).await.is_ok());
    }
}
