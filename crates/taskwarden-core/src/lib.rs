pub mod config;
pub mod error;
pub mod event;
pub mod task;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, Result, TaskwardenError};
pub use event::EventBus;
pub use task::*;
pub use types::*;
