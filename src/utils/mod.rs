pub mod config;
pub mod logger;
pub mod search_toml;

pub use config::*;
pub use logger::{report_fatal, setup_logging};
pub use search_toml::{ConfigOverrides, SearchConfig};
