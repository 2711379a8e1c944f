use anyhow::Result;

/// Delivery side of the "resume your session" reminder.
///
/// There is a single logical reminder campaign with a fixed identity on
/// the scheduler side; `cancel_all_reminders` clears everything scheduled
/// or already delivered under it. The engine treats both calls as
/// fire-and-forget: failures are logged and never block a transition.
pub trait ReminderScheduler: Send + Sync {
    /// Schedule the campaign to fire after `delay_secs`. A delay of zero
    /// means deliver immediately. `repeat` asks the scheduler to keep
    /// re-firing at the same interval until cancelled.
    fn schedule_reminder(&self, delay_secs: u64, repeat: bool) -> Result<()>;

    /// Cancel everything outstanding and delivered under the campaign.
    fn cancel_all_reminders(&self) -> Result<()>;
}
