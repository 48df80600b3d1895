//! Caller-supplied metadata.
//!
//! The engine keeps no global state; front ends build a [`FactoryConfig`]
//! once and hand it to [`crate::api::CertFactory::new`].

use serde::{Deserialize, Serialize};

/// Version and build metadata reported by [`crate::api::CertFactory::version`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FactoryConfig {
    /// Release version of the front end or library.
    pub version: String,
    /// Free-form build identifier, e.g. a commit hash. May be empty.
    pub build_id: String,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_id: String::new(),
        }
    }
}

impl FactoryConfig {
    pub fn new(version: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            build_id: build_id.into(),
        }
    }
}
