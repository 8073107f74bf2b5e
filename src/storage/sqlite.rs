//! SQLite-backed profile store
//!
//! All statements run on tokio-rusqlite's single background connection, so
//! each call closure is atomic with respect to every other write. The schema
//! is applied by embedded refinery migrations when the store is opened.

use super::{ProfileStore, ProfileUpdate, StoreStats};
use crate::error::{ChatError, Result};
use crate::types::{AbuseReport, ChatLogEntry, UserId, UserProfile};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

const PROFILE_COLUMNS: &str = "user_id, gender, preferred_gender, rating_sum, rating_count, \
                               is_premium, ghost_ban_until, last_partner";

/// Convert tokio-rusqlite errors into `ChatError::Storage`
fn map_tr_err<E: std::error::Error>(e: tokio_rusqlite::Error<E>) -> anyhow::Error {
    ChatError::Storage {
        message: format!("database error: {e}"),
    }
    .into()
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let gender: Option<String> = row.get(1)?;
    let preferred_gender: Option<String> = row.get(2)?;
    let last_partner: i64 = row.get(7)?;
    Ok(UserProfile {
        user_id: row.get(0)?,
        gender: gender.and_then(|g| g.parse().ok()),
        preferred_gender: preferred_gender.and_then(|g| g.parse().ok()),
        rating_sum: row.get(3)?,
        rating_count: row.get(4)?,
        is_premium: row.get(5)?,
        ghost_ban_until: row.get(6)?,
        last_partner: (last_partner != 0).then_some(last_partner),
    })
}

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatLogEntry> {
    Ok(ChatLogEntry {
        user_id: row.get(0)?,
        partner_id: row.get(1)?,
        timestamp: row.get(2)?,
        message_type: row.get(3)?,
        content: row.get(4)?,
    })
}

fn select_profile(conn: &rusqlite::Connection, user_id: UserId) -> rusqlite::Result<UserProfile> {
    conn.query_row(
        &format!("SELECT {PROFILE_COLUMNS} FROM users WHERE user_id = ?1"),
        params![user_id],
        row_to_profile,
    )
}

fn insert_default(conn: &rusqlite::Connection, user_id: UserId) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (user_id) VALUES (?1)",
        params![user_id],
    )?;
    Ok(())
}

/// Column and bound value touched by a profile update
fn column_value(update: ProfileUpdate) -> (&'static str, Value) {
    let gender_value = |gender: Option<crate::types::Gender>| match gender {
        Some(g) => Value::Text(g.as_str().to_string()),
        None => Value::Null,
    };
    match update {
        ProfileUpdate::Gender(gender) => ("gender", gender_value(gender)),
        ProfileUpdate::PreferredGender(gender) => ("preferred_gender", gender_value(gender)),
        ProfileUpdate::Premium(premium) => ("is_premium", Value::Integer(premium as i64)),
        ProfileUpdate::GhostBanUntil(until) => ("ghost_ban_until", Value::Integer(until)),
        ProfileUpdate::LastPartner(partner) => ("last_partner", Value::Integer(partner)),
    }
}

/// Profile store persisted in a SQLite database file
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply pending migrations
    pub async fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).await.map_err(|e| ChatError::Storage {
            message: format!("failed to open {path}: {e}"),
        })?;
        let store = Self { conn };
        store.migrate().await?;
        info!("Opened SQLite store at {}", path);
        Ok(store)
    }

    /// Open a private in-memory database with the schema applied
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| ChatError::Storage {
                message: format!("failed to open in-memory database: {e}"),
            })?;
        let store = Self { conn };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let report = self
            .conn
            .call(|conn| embedded::migrations::runner().run(conn))
            .await
            .map_err(map_tr_err)?;
        debug!(
            "Applied {} schema migration(s)",
            report.applied_migrations().len()
        );
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        self.conn
            .call(move |conn| -> std::result::Result<_, rusqlite::Error> {
                select_profile(conn, user_id).optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn ensure_profile(&self, user_id: UserId) -> Result<UserProfile> {
        self.conn
            .call(move |conn| -> std::result::Result<_, rusqlite::Error> {
                insert_default(conn, user_id)?;
                select_profile(conn, user_id)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn upsert_profile(&self, user_id: UserId, update: ProfileUpdate) -> Result<UserProfile> {
        let (column, value) = column_value(update);
        self.conn
            .call(move |conn| -> std::result::Result<_, rusqlite::Error> {
                let tx = conn.transaction()?;
                insert_default(&tx, user_id)?;
                tx.execute(
                    &format!("UPDATE users SET {column} = ?2 WHERE user_id = ?1"),
                    params![user_id, value],
                )?;
                let profile = select_profile(&tx, user_id)?;
                tx.commit()?;
                Ok(profile)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn record_rating(&self, ratee: UserId, score: i64) -> Result<UserProfile> {
        self.conn
            .call(move |conn| -> std::result::Result<_, rusqlite::Error> {
                let tx = conn.transaction()?;
                insert_default(&tx, ratee)?;
                tx.execute(
                    "UPDATE users SET rating_sum = rating_sum + ?2, rating_count = rating_count + 1 \
                     WHERE user_id = ?1",
                    params![ratee, score],
                )?;
                let profile = select_profile(&tx, ratee)?;
                tx.commit()?;
                Ok(profile)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn append_log(&self, entry: &ChatLogEntry) -> Result<()> {
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> std::result::Result<_, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO chats (user_id, partner_id, timestamp, message_type, content) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        entry.user_id,
                        entry.partner_id,
                        entry.timestamp,
                        entry.message_type,
                        entry.content
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn append_report(&self, report: &AbuseReport) -> Result<i64> {
        let report = report.clone();
        self.conn
            .call(move |conn| -> std::result::Result<_, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO reports (reporter, reported) VALUES (?1, ?2)",
                    params![report.reporter, report.reported],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn recent_logs(&self, user_id: UserId, limit: usize) -> Result<Vec<ChatLogEntry>> {
        let limit = limit as i64;
        self.conn
            .call(move |conn| -> std::result::Result<_, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT user_id, partner_id, timestamp, message_type, content FROM chats \
                     WHERE user_id = ?1 OR partner_id = ?1 ORDER BY id DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![user_id, limit], row_to_log)?;
                let mut entries = rows.collect::<std::result::Result<Vec<_>, _>>()?;
                entries.reverse();
                Ok(entries)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn report_count(&self, reported: UserId) -> Result<u64> {
        self.conn
            .call(move |conn| -> std::result::Result<_, rusqlite::Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM reports WHERE reported = ?1",
                    params![reported],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.conn
            .call(|conn| -> std::result::Result<_, rusqlite::Error> {
                let count = |sql: &str| -> rusqlite::Result<u64> {
                    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                    Ok(n as u64)
                };
                Ok(StoreStats {
                    users: count("SELECT COUNT(*) FROM users")?,
                    premium_users: count("SELECT COUNT(*) FROM users WHERE is_premium = 1")?,
                    reports: count("SELECT COUNT(*) FROM reports")?,
                    chat_lines: count("SELECT COUNT(*) FROM chats")?,
                })
            })
            .await
            .map_err(map_tr_err)
    }
}
