//! psrsieve: control plane of a radio-pulsar periodicity search

pub mod budget;
pub mod engine;
pub mod error;
pub mod known;
pub mod observation;
pub mod pipeline;
pub mod plan;
pub mod report;
pub mod sift;
pub mod structure;
pub mod task;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::{FatalError, ParseError, PlanError, TaskError};

/// Result alias used by the public psrsieve API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
