//! Mocks and fixtures shared by the Taskwarden test suites.

mod fixtures;
mod responder;
mod store;

pub use fixtures::{sample_records, test_config, test_config_in};
pub use responder::{RecordedCall, ScriptedResponder, Step};
pub use store::{FixedSearch, MemoryTaskStore};
