use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Pause, Session};

/// Durable record of sessions and their pause intervals.
///
/// The engine issues exactly one `create_session` per start, one
/// `create_pause` per pause, one `close_pause` per resume, and one
/// `close_session` per stop. Every method is fallible; callers report
/// failures upward rather than swallowing them.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, id: &str, started_at: DateTime<Utc>) -> Result<()>;

    async fn close_session(
        &self,
        id: &str,
        stopped_at: DateTime<Utc>,
        total_ms: u64,
        work_ms: u64,
    ) -> Result<()>;

    async fn create_pause(
        &self,
        id: &str,
        session_id: &str,
        pause_started_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn close_pause(
        &self,
        id: &str,
        pause_ended_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<()>;

    /// Sessions whose `started_at` falls within `[from, to]`, newest first.
    async fn fetch_sessions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>>;

    /// Pause intervals for one session, ordered by `pause_started_at`.
    async fn fetch_pauses(&self, session_id: &str) -> Result<Vec<Pause>>;

    async fn delete_session(&self, id: &str) -> Result<()>;

    async fn delete_all_sessions(&self) -> Result<()>;

    /// Sessions still marked open, for startup crash recovery.
    async fn get_open_sessions(&self) -> Result<Vec<Session>>;

    /// Close a recovered session with a ledger computed by the caller.
    async fn mark_session_interrupted(
        &self,
        id: &str,
        stopped_at: DateTime<Utc>,
        total_ms: u64,
        work_ms: u64,
    ) -> Result<()>;

    /// Close every dangling pause of a session at the given instant.
    async fn finalize_open_pauses(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;
}
