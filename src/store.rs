//! Pooled relational store for users, role memberships, and sessions.
//!
//! All shared state lives here; request handlers hold no mutable in-process
//! state. Connections are acquired from a bounded sqlx pool inside each call
//! and released on every exit path. Role rows are folded into proper sets at
//! this boundary so duplicate memberships and storage-side ordering never
//! reach the core logic.
//!
//! Timestamps are stored as unix milliseconds; `expiration_time IS NULL`
//! marks a non-expiring "remember me" session. Liveness is evaluated lazily
//! at lookup time, never by background sweeps.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use thiserror::Error;

use crate::identity::{Profile, UserSummary};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A full user row, including the stored credential hash. Read-only to the
/// core; provisioning happens at startup or out of band.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub password_hash: String,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect with a bounded pool. Acquisition blocks the calling task when
    /// the pool is exhausted, which is the service's backpressure point.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single never-reaped connection: the
    /// database lives and dies with it.
    pub async fn connect_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    /// Idempotent schema bootstrap.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                password_hash TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS userroles (
                user_id INTEGER NOT NULL,
                role_name TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                key_value TEXT NOT NULL UNIQUE,
                expiration_time INTEGER
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str, name: &str, password_hash: &str) -> StoreResult<i64> {
        let res = sqlx::query("INSERT INTO users (username, name, password_hash) VALUES (?, ?, ?)")
            .bind(username)
            .bind(name)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn assign_role(&self, user_id: i64, role_name: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO userroles (user_id, role_name) VALUES (?, ?)")
            .bind(user_id)
            .bind(role_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn user_by_username(&self, username: &str) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, name, password_hash FROM users WHERE username = ? LIMIT 1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn user_id_by_username(&self, username: &str) -> StoreResult<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ? LIMIT 1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Persist a new session row. The UNIQUE constraint on `key_value` is the
    /// uniqueness authority; token entropy makes collisions negligible.
    pub async fn insert_session(
        &self,
        user_id: i64,
        key_value: &str,
        expiration_time: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        sqlx::query("INSERT INTO sessions (user_id, key_value, expiration_time) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(key_value)
            .bind(expiration_time.map(|t| t.timestamp_millis()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resolve a live session to its owning user id. Expired and unknown
    /// tokens are indistinguishable to callers.
    pub async fn resolve_session(&self, key_value: &str, now: DateTime<Utc>) -> StoreResult<Option<i64>> {
        let user_id = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM sessions
             WHERE key_value = ?
             AND (expiration_time IS NULL OR expiration_time > ?)
             LIMIT 1",
        )
        .bind(key_value)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id)
    }

    /// Roles held by the owner of a live session, as one query scoped by the
    /// same liveness predicate as `resolve_session`. An expired session yields
    /// an empty set.
    pub async fn roles_for_live_session(
        &self,
        key_value: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<BTreeSet<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT r.role_name FROM sessions s
             JOIN users u ON s.user_id = u.id
             JOIN userroles r ON u.id = r.user_id
             WHERE s.key_value = ?
             AND (s.expiration_time IS NULL OR s.expiration_time > ?)",
        )
        .bind(key_value)
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn profile_by_username(&self, username: &str) -> StoreResult<Option<Profile>> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT u.username, u.name, r.role_name FROM users u
             LEFT JOIN userroles r ON u.id = r.user_id
             WHERE u.username = ?",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        Ok(fold_profile(rows))
    }

    pub async fn profile_by_id(&self, id: i64) -> StoreResult<Option<Profile>> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT u.username, u.name, r.role_name FROM users u
             LEFT JOIN userroles r ON u.id = r.user_id
             WHERE u.id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(fold_profile(rows))
    }

    pub async fn list_users(&self) -> StoreResult<Vec<UserSummary>> {
        let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
            "SELECT u.id, u.username, u.name, r.role_name FROM users u
             LEFT JOIN userroles r ON u.id = r.user_id
             ORDER BY u.id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut users: BTreeMap<i64, UserSummary> = BTreeMap::new();
        for (id, username, name, role) in rows {
            let entry = users.entry(id).or_insert_with(|| UserSummary {
                id,
                username,
                name,
                roles: BTreeSet::new(),
            });
            if let Some(role) = role {
                entry.roles.insert(role);
            }
        }
        Ok(users.into_values().collect())
    }
}

fn fold_profile(rows: Vec<(String, String, Option<String>)>) -> Option<Profile> {
    let (username, name) = {
        let first = rows.first()?;
        (first.0.clone(), first.1.clone())
    };
    let roles = rows.into_iter().filter_map(|(_, _, role)| role).collect();
    Some(Profile { username, name, roles })
}
