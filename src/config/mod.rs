//! Configuration module
//!
//! Handles user configuration (`<config dir>/gitflow/config.toml`) layered
//! with `GITFLOW_*` environment variables.

mod settings;

pub use settings::*;
