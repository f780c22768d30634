//! Process level concerns shared by the binaries: configuration and logging.

pub mod config;
pub mod logging;
