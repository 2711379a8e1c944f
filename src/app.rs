use std::{path::Path, sync::Arc};

use anyhow::Result;
use log::warn;

use crate::{
    clock::{Clock, SystemClock},
    db::Database,
    engine::TimerEngine,
    monitor::{ActivityMonitor, ActivityRouter},
    reminder::ReminderScheduler,
    settings::SettingsStore,
    store::SessionStore,
};

/// Initialize logging (reads RUST_LOG env var). Call once from the
/// embedding binary, not from library code.
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

/// Composition root: opens the database under `data_dir`, recovers
/// sessions a previous process left open, builds the engine, and wires
/// monitor events into it. The monitor and reminder scheduler come from
/// the embedder; everything here is an explicitly constructed object, so
/// tests swap in doubles freely.
pub struct App {
    engine: TimerEngine,
    store: Arc<dyn SessionStore>,
    settings: SettingsStore,
    router: ActivityRouter,
}

impl App {
    pub async fn new(
        data_dir: &Path,
        monitor: &dyn ActivityMonitor,
        reminders: Arc<dyn ReminderScheduler>,
    ) -> Result<Self> {
        let database = Database::new(data_dir.join("studytimer.sqlite3"))?;
        let store: Arc<dyn SessionStore> = Arc::new(database);
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;

        let clock = Arc::new(SystemClock);
        recover_open_sessions(store.as_ref(), clock.as_ref()).await?;

        let engine = TimerEngine::new(store.clone(), reminders, clock, settings.engine());

        let mut router = ActivityRouter::new();
        router.start(monitor, engine.clone())?;

        Ok(Self {
            engine,
            store,
            settings,
            router,
        })
    }

    pub fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    /// History access for review surfaces: fetch, delete, delete-all.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Stop routing monitor events. An open session is deliberately left
    /// open; the next startup recovers it as interrupted.
    pub async fn shutdown(&mut self) {
        self.router.stop().await;
    }
}

/// Close sessions left open by a previous process. Dangling pauses close
/// at the recovery instant, the ledger is recomputed from the persisted
/// timestamps, and the session is marked interrupted. Restores the
/// at-most-one-open-session invariant before the engine starts.
pub async fn recover_open_sessions(store: &dyn SessionStore, clock: &dyn Clock) -> Result<()> {
    for session in store.get_open_sessions().await? {
        let now = clock.now();

        let mut paused_ms: u64 = 0;
        for pause in store.fetch_pauses(&session.id).await? {
            let span_ms = match pause.duration_ms {
                Some(span_ms) => span_ms,
                None => (now - pause.pause_started_at).num_milliseconds().max(0) as u64,
            };
            paused_ms = paused_ms.saturating_add(span_ms);
        }

        store.finalize_open_pauses(&session.id, now).await?;

        let total_ms = (now - session.started_at).num_milliseconds().max(0) as u64;
        let work_ms = total_ms.saturating_sub(paused_ms);
        store
            .mark_session_interrupted(&session.id, now, total_ms, work_ms)
            .await?;

        warn!(
            "Recovered incomplete session {}; marked as Interrupted (total={total_ms}ms work={work_ms}ms)",
            session.id
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionStatus;
    use chrono::{DateTime, Duration, Utc};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn recovery_interrupts_open_sessions_with_computed_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("studytimer.sqlite3")).unwrap();

        let started = t0();
        db.create_session("s1", started).await.unwrap();
        db.create_pause("p1", "s1", started + Duration::seconds(10))
            .await
            .unwrap();

        let clock = FixedClock(started + Duration::seconds(60));
        recover_open_sessions(&db, &clock).await.unwrap();

        assert!(db.get_open_sessions().await.unwrap().is_empty());

        let sessions = db
            .fetch_sessions(started - Duration::days(1), started + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Interrupted);
        assert_eq!(sessions[0].total_ms, 60_000);
        // 10s of work before the pause; the dangling pause covers the rest.
        assert_eq!(sessions[0].work_ms, 10_000);

        let pauses = db.fetch_pauses("s1").await.unwrap();
        assert_eq!(pauses[0].duration_ms, Some(50_000));
    }

    #[tokio::test]
    async fn recovery_is_a_no_op_without_open_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("studytimer.sqlite3")).unwrap();

        let clock = FixedClock(t0());
        recover_open_sessions(&db, &clock).await.unwrap();
        assert!(db.get_open_sessions().await.unwrap().is_empty());
    }
}
