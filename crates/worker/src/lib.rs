//! Worker entrypoint: selects a handler by worker-kind label and supervises
//! a consumer against the process shutdown signal.

pub mod handlers;
pub mod kind;
pub mod registry;
pub mod settings;

pub use kind::{WorkerError, WorkerKind};
pub use registry::HandlerRegistry;
pub use settings::WorkerSettings;
