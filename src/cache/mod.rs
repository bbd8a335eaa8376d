//! Dependency cache validation
//!
//! Installed gems are carried between builds in the cache store and reused
//! only while they were built for the same set of runtimes.
//!
//! # Cache States
//!
//! | State | Description |
//! |-------|-------------|
//! | Loaded | Cached paths restored, prior fingerprint read |
//! | Validated | Current fingerprint observed and compared |
//! | Purged | Gems discarded; Bundler reinstalls everything |
//! | Kept | Gems reused |
//! | Persisted | Cache and fingerprint written back after success |
//!
//! # Purge Rules
//!
//! - The set of runtimes differs from the previous build (any change,
//!   including patch releases)
//! - Cached gems exist but no Bundler version was ever recorded
//!
//! A change in the RubyGems version alone does not purge.

pub mod fingerprint;
pub mod manager;
pub mod usage;

pub use fingerprint::{CacheFingerprint, InstalledRuntime};
pub use manager::{CacheDecision, CacheManager, CacheState, PurgeReason, CACHED_PATHS};
pub use usage::{dir_size, format_bytes};
