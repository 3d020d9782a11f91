pub mod orchestrator;
pub mod providers;

pub use orchestrator::{assert_no_duplicate_claims, spawn_concurrent_dispatchers};
pub use providers::{RecordingEmailProvider, RecordingSmsProvider, SmsCall};
