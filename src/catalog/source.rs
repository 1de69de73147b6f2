//! Catalog source abstraction.
//!
//! A source hands back the raw JSON document; parsing and validation happen
//! in [`RuleCatalog::load`](super::RuleCatalog::load) so every source gets
//! the same all-or-nothing treatment.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::CatalogError;

/// Catalog shipped with the crate.
pub const BUILTIN_RULES_JSON: &str = include_str!("../../data/rules.json");

/// Trait abstracting where the rule catalog document comes from.
#[async_trait]
pub trait CatalogSource: Send + Sync + 'static {
    /// Fetch the raw JSON document.
    ///
    /// Returns `CatalogError::Unavailable` when the document cannot be read.
    async fn fetch(&self) -> Result<String, CatalogError>;

    /// Human-readable name for logging (e.g. a file path or "builtin").
    fn source_name(&self) -> &str;
}

// ============================================================================
// File Source
// ============================================================================

/// Reads the catalog from a JSON file on disk.
pub struct FileCatalogSource {
    path: PathBuf,
    name: String,
}

impl FileCatalogSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self { path, name }
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn fetch(&self) -> Result<String, CatalogError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CatalogError::Unavailable {
                origin: self.name.clone(),
                reason: e.to_string(),
            })
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Static Source
// ============================================================================

/// Serves a JSON document held in memory.
pub struct StaticCatalogSource {
    name: String,
    json: String,
}

impl StaticCatalogSource {
    pub fn new(name: impl Into<String>, json: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            json: json.into(),
        }
    }

    /// The catalog bundled at `data/rules.json`.
    pub fn builtin() -> Self {
        Self::new("builtin", BUILTIN_RULES_JSON)
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch(&self) -> Result<String, CatalogError> {
        Ok(self.json.clone())
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}
