pub mod controller;
pub mod state;

pub use controller::{EngineError, TimerEngine};
pub use state::{EnginePhase, EngineSnapshot, EngineState};
