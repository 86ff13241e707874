pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod logging;
pub mod replay;
pub mod services;
pub mod session;
pub mod store;
pub mod types;

pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use session::{Answer, AttemptResult, Session, SessionOrchestrator, SessionSummary};
