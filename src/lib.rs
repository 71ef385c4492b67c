pub mod config;
pub mod core;
pub mod session;

// Re-export commonly used items for convenience
pub use config::{ClientConfig, ConfigError};
pub use crate::core::*;
pub use session::{Session, SessionBuilder, SessionError, SessionEvent, SessionResult};
