use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EnginePhase {
    Idle,
    Running,
    Paused,
}

impl Default for EnginePhase {
    fn default() -> Self {
        EnginePhase::Idle
    }
}

/// What observers see: the current phase and the elapsed display value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub phase: EnginePhase,
    pub elapsed_ms: u64,
}

/// Transient engine state. Process-lifetime only, never persisted.
///
/// Elapsed time is anchor/baseline accounting: `elapsed_baseline_ms` holds
/// the value frozen when the current run segment began and `run_anchor`
/// the wall-clock instant it began, so a read is always `baseline + (now −
/// anchor)` recomputed from absolute timestamps. Missed or delayed ticks
/// cannot drift it.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub phase: EnginePhase,
    pub session_id: Option<String>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub open_pause_id: Option<String>,
    pub open_pause_started_at: Option<DateTime<Utc>>,
    /// Sum of closed pause spans for the current session.
    pub paused_ms: u64,
    /// Elapsed value at the start of the current run segment. While paused
    /// this doubles as the frozen display value (and is what
    /// `manual_adjust` overrides).
    pub elapsed_baseline_ms: u64,
    pub run_anchor: Option<DateTime<Utc>>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        match (self.phase, self.run_anchor) {
            (EnginePhase::Running, Some(anchor)) => self
                .elapsed_baseline_ms
                .saturating_add((now - anchor).num_milliseconds().max(0) as u64),
            _ => self.elapsed_baseline_ms,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.phase,
            elapsed_ms: self.elapsed_ms(now),
        }
    }

    pub fn begin_session(&mut self, session_id: String, now: DateTime<Utc>) {
        *self = Self {
            phase: EnginePhase::Running,
            session_id: Some(session_id),
            session_started_at: Some(now),
            open_pause_id: None,
            open_pause_started_at: None,
            paused_ms: 0,
            elapsed_baseline_ms: 0,
            run_anchor: Some(now),
        };
    }

    /// Freeze the display value and record the open pause.
    pub fn begin_pause(&mut self, pause_id: String, now: DateTime<Utc>) {
        self.elapsed_baseline_ms = self.elapsed_ms(now);
        self.run_anchor = None;
        self.phase = EnginePhase::Paused;
        self.open_pause_id = Some(pause_id);
        self.open_pause_started_at = Some(now);
    }

    /// Close the open pause (returning its id and span) and re-anchor the
    /// run segment at `now`. The display value continues from whatever was
    /// frozen, including a manual adjustment.
    pub fn end_pause(&mut self, now: DateTime<Utc>) -> Option<(String, u64)> {
        let pause_id = self.open_pause_id.take()?;
        let started_at = self.open_pause_started_at.take()?;

        let span_ms = (now - started_at).num_milliseconds().max(0) as u64;
        self.paused_ms = self.paused_ms.saturating_add(span_ms);
        self.run_anchor = Some(now);
        self.phase = EnginePhase::Running;

        Some((pause_id, span_ms))
    }

    /// Override the frozen display value. Valid only while paused; the
    /// session and pause timestamps are untouched.
    pub fn override_elapsed(&mut self, elapsed_ms: u64) {
        self.elapsed_baseline_ms = elapsed_ms;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn elapsed_is_zero_while_idle() {
        let state = EngineState::new();
        assert_eq!(state.phase, EnginePhase::Idle);
        assert_eq!(state.elapsed_ms(t0()), 0);
    }

    #[test]
    fn elapsed_accrues_from_anchor_while_running() {
        let mut state = EngineState::new();
        state.begin_session("s1".into(), t0());

        assert_eq!(state.elapsed_ms(t0()), 0);
        assert_eq!(state.elapsed_ms(t0() + Duration::seconds(7)), 7_000);
        assert_eq!(state.elapsed_ms(t0() + Duration::milliseconds(7_250)), 7_250);
    }

    #[test]
    fn elapsed_freezes_across_pause() {
        let mut state = EngineState::new();
        state.begin_session("s1".into(), t0());
        state.begin_pause("p1".into(), t0() + Duration::seconds(10));

        // Frozen at the pause instant no matter how far the clock moves.
        assert_eq!(state.elapsed_ms(t0() + Duration::seconds(10)), 10_000);
        assert_eq!(state.elapsed_ms(t0() + Duration::seconds(500)), 10_000);
    }

    #[test]
    fn resume_continues_from_frozen_value_and_accumulates_pause() {
        let mut state = EngineState::new();
        state.begin_session("s1".into(), t0());
        state.begin_pause("p1".into(), t0() + Duration::seconds(10));

        let closed = state.end_pause(t0() + Duration::seconds(40)).unwrap();
        assert_eq!(closed, ("p1".to_string(), 30_000));
        assert_eq!(state.paused_ms, 30_000);
        assert_eq!(state.phase, EnginePhase::Running);

        assert_eq!(state.elapsed_ms(t0() + Duration::seconds(50)), 20_000);
    }

    #[test]
    fn override_applies_to_display_only() {
        let mut state = EngineState::new();
        state.begin_session("s1".into(), t0());
        state.begin_pause("p1".into(), t0() + Duration::seconds(10));

        state.override_elapsed(5_400_000);
        assert_eq!(state.elapsed_ms(t0() + Duration::seconds(99)), 5_400_000);

        // Pause bookkeeping is untouched by the override.
        let (_, span) = state.end_pause(t0() + Duration::seconds(40)).unwrap();
        assert_eq!(span, 30_000);
        assert_eq!(
            state.elapsed_ms(t0() + Duration::seconds(41)),
            5_401_000
        );
    }

    #[test]
    fn end_pause_without_open_pause_is_none() {
        let mut state = EngineState::new();
        state.begin_session("s1".into(), t0());
        assert!(state.end_pause(t0()).is_none());
    }
}
