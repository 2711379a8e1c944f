pub mod app;
pub mod clock;
pub mod db;
pub mod engine;
pub mod models;
pub mod monitor;
pub mod reminder;
pub mod settings;
pub mod store;
pub mod utils;

pub use app::{init_logging, recover_open_sessions, App};
pub use clock::{Clock, SystemClock};
pub use db::Database;
pub use engine::{EngineError, EnginePhase, EngineSnapshot, TimerEngine};
pub use models::{Pause, Session, SessionStatus};
pub use monitor::{ActivityEvent, ActivityHub, ActivityMonitor, ActivityRouter};
pub use reminder::ReminderScheduler;
pub use settings::{EngineSettings, SettingsStore};
pub use store::SessionStore;
