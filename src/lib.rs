//! rbpack - Ruby application build pipeline
//!
//! Turns a Ruby application source tree into a runnable artifact: selects
//! and installs a Ruby runtime, installs gems with Bundler, and reuses
//! installed gems across builds while they remain valid.

pub mod artifact;
pub mod bundler;
pub mod cache;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod layout;
pub mod lockfile;
pub mod pipeline;
pub mod store;
pub mod ui;
pub mod version;

pub use error::{RbpackError, RbpackResult};

/// Version tag recorded alongside cached gems
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");
