mod pause;
mod session;

pub use pause::Pause;
pub use session::{Session, SessionStatus};
