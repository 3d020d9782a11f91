pub mod singleton;
pub mod worker;

pub use singleton::{assert_unique, SingletonConflict};
pub use worker::{install_signal_handlers, BatchReport, Worker, WorkerOptions};
