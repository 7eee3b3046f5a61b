//! Configuration utilities re-exported at the crate root.
//!
//! This exposes [`Settings`] and [`DatabaseConfig`] so applications can load settings
//! from `config/config.toml` or `COMMISSION__*` environment variables.

pub use crate::pool::config::*;
