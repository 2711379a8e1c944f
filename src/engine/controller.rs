use std::{sync::Arc, time::Duration};

use log::{info, warn};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time,
};
use uuid::Uuid;

use crate::{
    clock::Clock, monitor::ActivityEvent, reminder::ReminderScheduler, settings::EngineSettings,
    store::SessionStore,
};

use super::state::{EnginePhase, EngineSnapshot, EngineState};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The in-memory transition completed but the durable record did not.
    #[error("session store failure: {0}")]
    Store(anyhow::Error),
}

/// The session timer engine.
///
/// All transitions serialize on one mutex, held for the whole transition
/// including the store write, so commands and monitor signals can never
/// interleave partially. Reminder calls are fire-and-forget: a scheduler
/// failure is logged and never fails a transition. A store failure is
/// returned to the caller, but only after the in-memory transition has
/// completed; engine state is never left inconsistent because durable
/// logging failed.
#[derive(Clone)]
pub struct TimerEngine {
    state: Arc<Mutex<EngineState>>,
    store: Arc<dyn SessionStore>,
    reminders: Arc<dyn ReminderScheduler>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<EngineSnapshot>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
    reminder_delay_secs: u64,
    reminder_repeats: bool,
}

impl TimerEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        reminders: Arc<dyn ReminderScheduler>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            state: Arc::new(Mutex::new(EngineState::new())),
            store,
            reminders,
            clock,
            event_tx,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_millis(settings.tick_interval_ms.max(1)),
            reminder_delay_secs: settings.reminder_delay_secs,
            reminder_repeats: settings.reminder_repeats,
        }
    }

    /// Stream of `(phase, elapsed)` snapshots: one per transition, one per
    /// tick while running.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineSnapshot> {
        self.event_tx.subscribe()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        let state = self.state.lock().await;
        state.snapshot(self.clock.now())
    }

    /// Begin a session, or resume the open one when paused. A no-op while
    /// already running.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        match state.phase {
            EnginePhase::Running => return Ok(()),
            EnginePhase::Paused => {
                let result = self.resume_locked(&mut state).await;
                drop(state);
                self.spawn_ticker().await;
                return result;
            }
            EnginePhase::Idle => {}
        }

        let now = self.clock.now();
        let session_id = Uuid::new_v4().to_string();
        state.begin_session(session_id.clone(), now);

        let store_result = self.store.create_session(&session_id, now).await;
        self.publish(&state);
        drop(state);

        self.spawn_ticker().await;
        info!("Session {session_id} started");
        store_result.map_err(EngineError::Store)
    }

    /// Freeze the timer and open a pause interval. A no-op unless running.
    pub async fn pause(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.phase != EnginePhase::Running {
            return Ok(());
        }
        let Some(session_id) = state.session_id.clone() else {
            return Ok(());
        };

        let now = self.clock.now();
        let pause_id = Uuid::new_v4().to_string();
        state.begin_pause(pause_id.clone(), now);

        self.schedule_reminder(self.reminder_delay_secs);

        let store_result = self.store.create_pause(&pause_id, &session_id, now).await;
        self.publish(&state);
        drop(state);

        self.cancel_ticker().await;
        store_result.map_err(EngineError::Store)
    }

    /// Close the open pause and let time accrue again. A no-op unless
    /// paused.
    pub async fn resume(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.phase != EnginePhase::Paused {
            return Ok(());
        }

        let result = self.resume_locked(&mut state).await;
        drop(state);
        self.spawn_ticker().await;
        result
    }

    async fn resume_locked(&self, state: &mut EngineState) -> Result<(), EngineError> {
        let now = self.clock.now();
        let closed = state.end_pause(now);

        self.cancel_reminders();

        let mut store_result = Ok(());
        if let Some((pause_id, span_ms)) = closed {
            store_result = self.store.close_pause(&pause_id, now, span_ms).await;
        }
        self.publish(state);
        store_result.map_err(EngineError::Store)
    }

    /// Close the session. An open pause closes implicitly at the stop
    /// timestamp and counts as pause time. A no-op while idle.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.phase == EnginePhase::Idle {
            return Ok(());
        }

        let now = self.clock.now();
        let session_id = state.session_id.clone();
        let started_at = state.session_started_at;

        let open_pause = match (state.open_pause_id.clone(), state.open_pause_started_at) {
            (Some(id), Some(started)) => {
                Some((id, (now - started).num_milliseconds().max(0) as u64))
            }
            _ => None,
        };
        let mut paused_total_ms = state.paused_ms;
        if let Some((_, span_ms)) = &open_pause {
            paused_total_ms = paused_total_ms.saturating_add(*span_ms);
        }

        state.clear();
        self.cancel_reminders();
        self.publish(&state);

        let mut result = Ok(());
        if let (Some(session_id), Some(started_at)) = (session_id, started_at) {
            let total_ms = (now - started_at).num_milliseconds().max(0) as u64;
            let work_ms = total_ms.saturating_sub(paused_total_ms);

            if let Some((pause_id, span_ms)) = open_pause {
                if let Err(err) = self.store.close_pause(&pause_id, now, span_ms).await {
                    result = Err(EngineError::Store(err));
                }
            }

            match self
                .store
                .close_session(&session_id, now, total_ms, work_ms)
                .await
            {
                Ok(()) => {
                    info!("Session {session_id} closed: total={total_ms}ms work={work_ms}ms");
                }
                Err(err) => {
                    if result.is_ok() {
                        result = Err(EngineError::Store(err));
                    } else {
                        warn!("failed to close session {session_id}: {err:#}");
                    }
                }
            }
        }
        drop(state);

        self.cancel_ticker().await;
        result
    }

    /// Override the displayed elapsed time while paused. Minutes and
    /// seconds clamp to `[0, 59]`. Returns false (and changes nothing)
    /// unless paused. The session and pause timestamps backing the ledger
    /// are never touched.
    pub async fn manual_adjust(&self, hours: u32, minutes: u32, seconds: u32) -> bool {
        let mut state = self.state.lock().await;
        if state.phase != EnginePhase::Paused {
            return false;
        }

        let minutes = minutes.min(59);
        let seconds = seconds.min(59);
        let elapsed_secs =
            u64::from(hours) * 3600 + u64::from(minutes) * 60 + u64::from(seconds);
        state.override_elapsed(elapsed_secs * 1000);
        self.publish(&state);
        true
    }

    /// Entry point for system activity signals. Lock and sleep pause a
    /// running timer; unlock and wake never resume on their own, they only
    /// re-issue the reminder when the timer is still paused.
    pub async fn handle_activity(&self, event: ActivityEvent) -> Result<(), EngineError> {
        match event {
            ActivityEvent::Locked | ActivityEvent::Sleeping => self.pause().await,
            ActivityEvent::Unlocked | ActivityEvent::Waking => {
                self.remind_if_paused().await;
                Ok(())
            }
        }
    }

    /// Dismissal relayed from the notification layer. Clears the campaign
    /// without touching engine state.
    pub fn acknowledge_reminder(&self) {
        self.cancel_reminders();
    }

    async fn remind_if_paused(&self) {
        let state = self.state.lock().await;
        if state.phase != EnginePhase::Paused {
            return;
        }
        // The user is back in front of a frozen timer; replace whatever is
        // outstanding with an immediate one.
        self.cancel_reminders();
        self.schedule_reminder(0);
    }

    fn schedule_reminder(&self, delay_secs: u64) {
        if let Err(err) = self
            .reminders
            .schedule_reminder(delay_secs, self.reminder_repeats)
        {
            warn!("failed to schedule resume reminder: {err:#}");
        }
    }

    fn cancel_reminders(&self) {
        if let Err(err) = self.reminders.cancel_all_reminders() {
            warn!("failed to cancel resume reminders: {err:#}");
        }
    }

    fn publish(&self, state: &EngineState) {
        let _ = self.event_tx.send(state.snapshot(self.clock.now()));
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let clock = self.clock.clone();
        let event_tx = self.event_tx.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            loop {
                interval.tick().await;

                let snapshot = {
                    let state = state.lock().await;
                    if state.phase != EnginePhase::Running {
                        break;
                    }
                    state.snapshot(clock.now())
                };
                let _ = event_tx.send(snapshot);
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}
