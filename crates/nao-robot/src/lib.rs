pub mod catalog;
pub mod inflight;
pub mod mock;
pub mod poller;
pub mod services;
pub mod session;

pub use catalog::Catalog;
pub use session::{RobotSession, SessionConfig, SessionStatus};
