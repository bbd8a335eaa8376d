//! Runtime version identifiers and resolution

mod resolver;
mod runtime;

pub use resolver::{
    ArtifactSpec, InstallRule, ResolvedVersions, VersionCatalog, VersionResolver, VersionSource,
    CATALOG_NAME, VERSION_OVERRIDE_VAR,
};
pub use runtime::{Engine, RuntimeVersion, BOOTSTRAP_RUNTIME};
