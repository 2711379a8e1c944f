use std::{
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, Row};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{Pause, Session, SessionStatus};
use crate::store::SessionStore;
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("value {value} is negative"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn status_from_str(value: &str) -> Result<SessionStatus> {
    match value {
        "Running" => Ok(SessionStatus::Running),
        "Completed" => Ok(SessionStatus::Completed),
        "Interrupted" => Ok(SessionStatus::Interrupted),
        _ => Err(anyhow!("unknown session status '{value}'")),
    }
}

fn row_to_session(row: &Row<'_>) -> Result<Session> {
    Ok(Session {
        id: row.get::<_, String>("id")?,
        started_at: parse_datetime(&row.get::<_, String>("started_at")?)?,
        stopped_at: row
            .get::<_, Option<String>>("stopped_at")?
            .map(|s| parse_datetime(&s))
            .transpose()?,
        status: status_from_str(&row.get::<_, String>("status")?)?,
        total_ms: to_u64(row.get::<_, i64>("total_ms")?)?,
        work_ms: to_u64(row.get::<_, i64>("work_ms")?)?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?)?,
    })
}

fn row_to_pause(row: &Row<'_>) -> Result<Pause> {
    Ok(Pause {
        id: row.get::<_, String>("id")?,
        session_id: row.get::<_, String>("session_id")?,
        pause_started_at: parse_datetime(&row.get::<_, String>("pause_started_at")?)?,
        pause_ended_at: row
            .get::<_, Option<String>>("pause_ended_at")?
            .map(|s| parse_datetime(&s))
            .transpose()?,
        duration_ms: row
            .get::<_, Option<i64>>("duration_ms")?
            .map(to_u64)
            .transpose()?,
    })
}

/// SQLite-backed session store. A dedicated worker thread owns the
/// connection; callers hand it closures and await the reply, so the store
/// presents ordinary async methods without sharing the connection.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("studytimer-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn create_session(&self, id: &str, started_at: DateTime<Utc>) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, started_at, stopped_at, status, total_ms, work_ms, created_at, updated_at)
                 VALUES (?1, ?2, NULL, ?3, 0, 0, ?4, ?5)",
                params![
                    id,
                    started_at.to_rfc3339(),
                    SessionStatus::Running.as_str(),
                    started_at.to_rfc3339(),
                    started_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert session")?;
            Ok(())
        })
        .await
    }

    async fn close_session(
        &self,
        id: &str,
        stopped_at: DateTime<Utc>,
        total_ms: u64,
        work_ms: u64,
    ) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE sessions
                     SET status = ?1,
                         stopped_at = ?2,
                         total_ms = ?3,
                         work_ms = ?4,
                         updated_at = ?5
                     WHERE id = ?6",
                    params![
                        SessionStatus::Completed.as_str(),
                        stopped_at.to_rfc3339(),
                        to_i64(total_ms)?,
                        to_i64(work_ms)?,
                        stopped_at.to_rfc3339(),
                        id,
                    ],
                )
                .with_context(|| "failed to close session")?;

            if rows_affected == 0 {
                bail!("session {id} not found");
            }
            Ok(())
        })
        .await
    }

    async fn create_pause(
        &self,
        id: &str,
        session_id: &str,
        pause_started_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = id.to_string();
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO pauses (id, session_id, pause_started_at, pause_ended_at, duration_ms)
                 VALUES (?1, ?2, ?3, NULL, NULL)",
                params![id, session_id, pause_started_at.to_rfc3339()],
            )
            .with_context(|| "failed to insert pause record")?;
            Ok(())
        })
        .await
    }

    async fn close_pause(
        &self,
        id: &str,
        pause_ended_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE pauses
                     SET pause_ended_at = ?1,
                         duration_ms = ?2
                     WHERE id = ?3",
                    params![pause_ended_at.to_rfc3339(), to_i64(duration_ms)?, id],
                )
                .with_context(|| "failed to finalize pause record")?;

            if rows_affected == 0 {
                bail!("pause {id} not found");
            }
            Ok(())
        })
        .await
    }

    async fn fetch_sessions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, started_at, stopped_at, status, total_ms, work_ms, created_at, updated_at
                 FROM sessions
                 WHERE started_at >= ?1 AND started_at <= ?2
                 ORDER BY started_at DESC",
            )?;

            let mut rows = stmt.query(params![from.to_rfc3339(), to.to_rfc3339()])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    async fn fetch_pauses(&self, session_id: &str) -> Result<Vec<Pause>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, pause_started_at, pause_ended_at, duration_ms
                 FROM pauses
                 WHERE session_id = ?1
                 ORDER BY pause_started_at ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut pauses = Vec::new();
            while let Some(row) = rows.next()? {
                pauses.push(row_to_pause(row)?);
            }

            Ok(pauses)
        })
        .await
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM pauses WHERE session_id = ?1", params![id])?;
            tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_all_sessions(&self) -> Result<()> {
        self.execute(|conn| {
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM pauses", [])?;
            tx.execute("DELETE FROM sessions", [])?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_open_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, started_at, stopped_at, status, total_ms, work_ms, created_at, updated_at
                 FROM sessions
                 WHERE status = 'Running'
                 ORDER BY started_at DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    async fn mark_session_interrupted(
        &self,
        id: &str,
        stopped_at: DateTime<Utc>,
        total_ms: u64,
        work_ms: u64,
    ) -> Result<()> {
        let id = id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE sessions
                     SET status = ?1,
                         stopped_at = ?2,
                         total_ms = ?3,
                         work_ms = ?4,
                         updated_at = ?5
                     WHERE id = ?6",
                    params![
                        SessionStatus::Interrupted.as_str(),
                        stopped_at.to_rfc3339(),
                        to_i64(total_ms)?,
                        to_i64(work_ms)?,
                        stopped_at.to_rfc3339(),
                        id,
                    ],
                )
                .with_context(|| "failed to mark session interrupted")?;

            if rows_affected == 0 {
                bail!("session {id} not found");
            }
            Ok(())
        })
        .await
    }

    async fn finalize_open_pauses(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, pause_started_at FROM pauses
                 WHERE session_id = ?1 AND pause_ended_at IS NULL",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut dangling = Vec::new();
            while let Some(row) = rows.next()? {
                let pause_id: String = row.get(0)?;
                let started_at = parse_datetime(&row.get::<_, String>(1)?)?;
                dangling.push((pause_id, started_at));
            }
            drop(rows);
            drop(stmt);

            for (pause_id, started_at) in dangling {
                let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
                conn.execute(
                    "UPDATE pauses
                     SET pause_ended_at = ?1,
                         duration_ms = ?2
                     WHERE id = ?3",
                    params![ended_at.to_rfc3339(), to_i64(duration_ms)?, pause_id],
                )?;
            }

            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("studytimer.sqlite3")).unwrap();
        (dir, db)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn session_roundtrip() {
        let (_dir, db) = open_test_db().await;
        let started = t0();

        db.create_session("s1", started).await.unwrap();

        let open = db.get_open_sessions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "s1");
        assert_eq!(open[0].status, SessionStatus::Running);
        assert!(open[0].stopped_at.is_none());

        let stopped = started + Duration::seconds(50);
        db.close_session("s1", stopped, 50_000, 20_000)
            .await
            .unwrap();

        assert!(db.get_open_sessions().await.unwrap().is_empty());

        let sessions = db
            .fetch_sessions(started - Duration::days(1), started + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Completed);
        assert_eq!(sessions[0].total_ms, 50_000);
        assert_eq!(sessions[0].work_ms, 20_000);
        assert_eq!(sessions[0].stopped_at, Some(stopped));
    }

    #[tokio::test]
    async fn pause_roundtrip() {
        let (_dir, db) = open_test_db().await;
        let started = t0();
        db.create_session("s1", started).await.unwrap();

        let pause_at = started + Duration::seconds(10);
        db.create_pause("p1", "s1", pause_at).await.unwrap();

        let pauses = db.fetch_pauses("s1").await.unwrap();
        assert_eq!(pauses.len(), 1);
        assert!(pauses[0].pause_ended_at.is_none());
        assert!(pauses[0].duration_ms.is_none());

        let resumed_at = pause_at + Duration::seconds(30);
        db.close_pause("p1", resumed_at, 30_000).await.unwrap();

        let pauses = db.fetch_pauses("s1").await.unwrap();
        assert_eq!(pauses[0].pause_ended_at, Some(resumed_at));
        assert_eq!(pauses[0].duration_ms, Some(30_000));
    }

    #[tokio::test]
    async fn fetch_sessions_respects_range() {
        let (_dir, db) = open_test_db().await;
        let started = t0();
        db.create_session("inside", started).await.unwrap();
        db.create_session("outside", started - Duration::days(40))
            .await
            .unwrap();

        let sessions = db
            .fetch_sessions(started - Duration::days(30), started + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "inside");
    }

    #[tokio::test]
    async fn recovery_finalizes_open_pauses_and_interrupts() {
        let (_dir, db) = open_test_db().await;
        let started = t0();
        db.create_session("s1", started).await.unwrap();
        db.create_pause("p1", "s1", started + Duration::seconds(10))
            .await
            .unwrap();

        let recovered_at = started + Duration::seconds(60);
        db.finalize_open_pauses("s1", recovered_at).await.unwrap();
        db.mark_session_interrupted("s1", recovered_at, 60_000, 10_000)
            .await
            .unwrap();

        let pauses = db.fetch_pauses("s1").await.unwrap();
        assert_eq!(pauses[0].duration_ms, Some(50_000));

        let sessions = db
            .fetch_sessions(started - Duration::days(1), started + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(sessions[0].status, SessionStatus::Interrupted);
        assert_eq!(sessions[0].total_ms, 60_000);
        assert_eq!(sessions[0].work_ms, 10_000);
    }

    #[tokio::test]
    async fn delete_session_removes_its_pauses() {
        let (_dir, db) = open_test_db().await;
        let started = t0();
        db.create_session("s1", started).await.unwrap();
        db.create_pause("p1", "s1", started).await.unwrap();

        db.delete_session("s1").await.unwrap();

        assert!(db.fetch_pauses("s1").await.unwrap().is_empty());
        assert!(db
            .fetch_sessions(started - Duration::days(1), started + Duration::days(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_all_sessions_clears_everything() {
        let (_dir, db) = open_test_db().await;
        let started = t0();
        db.create_session("s1", started).await.unwrap();
        db.create_session("s2", started + Duration::hours(1))
            .await
            .unwrap();
        db.create_pause("p1", "s1", started).await.unwrap();

        db.delete_all_sessions().await.unwrap();

        assert!(db
            .fetch_sessions(started - Duration::days(1), started + Duration::days(1))
            .await
            .unwrap()
            .is_empty());
        assert!(db.fetch_pauses("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closing_unknown_session_errors() {
        let (_dir, db) = open_test_db().await;
        let result = db.close_session("missing", t0(), 0, 0).await;
        assert!(result.is_err());
    }
}
