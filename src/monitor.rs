use anyhow::{bail, Result};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::TimerEngine;

/// Edge-triggered system activity signals. Emitters deliver each physical
/// edge at most once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActivityEvent {
    Locked,
    Unlocked,
    Sleeping,
    Waking,
}

/// Source of system activity signals. Platform integrations implement
/// this; tests subscribe a hand-driven hub.
pub trait ActivityMonitor: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ActivityEvent>;
}

/// Broadcast-backed monitor for embedders that receive platform
/// notifications through their own callbacks and only need a place to
/// forward them.
pub struct ActivityHub {
    event_tx: broadcast::Sender<ActivityEvent>,
}

impl ActivityHub {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self { event_tx }
    }

    pub fn emit(&self, event: ActivityEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Default for ActivityHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityMonitor for ActivityHub {
    fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.event_tx.subscribe()
    }
}

/// Forwards monitor events into the engine's serialized entry point.
pub struct ActivityRouter {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl ActivityRouter {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(&mut self, monitor: &dyn ActivityMonitor, engine: TimerEngine) -> Result<()> {
        if self.handle.is_some() {
            bail!("activity router already running");
        }

        let mut rx = monitor.subscribe();
        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token_clone.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            if let Err(err) = engine.handle_activity(event).await {
                                error!("activity-driven transition failed to persist: {err}");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("activity router lagged, dropped {skipped} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                error!("activity router task failed to join: {err}");
            }
        }
    }
}

impl Default for ActivityRouter {
    fn default() -> Self {
        Self::new()
    }
}
