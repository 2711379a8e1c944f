use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// Session is open. Covers both running and paused phases; the split
    /// is engine state, not ledger state.
    Running,
    Completed,
    /// Session was left open by a previous process and closed at startup.
    Interrupted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "Running",
            SessionStatus::Completed => "Completed",
            SessionStatus::Interrupted => "Interrupted",
        }
    }
}

/// One continuous study attempt, from start to stop.
///
/// `total_ms` is the wall-clock span including pauses; `work_ms` is
/// `total_ms` minus the session's pause intervals. Both are zero until the
/// session closes. `stopped_at` is set iff the session is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub total_ms: u64,
    pub work_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
