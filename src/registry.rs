//! Named engines under one root directory
//!
//! Each index lives in `{root}/{name}` and is opened on first use. Lookup and
//! creation happen under the map's entry lock, so two callers asking for the
//! same new name share one engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{Result, RtSearchError};

pub struct IndexRegistry {
    root: PathBuf,
    /// Settings applied to every index; name and data_dir are overridden
    template: EngineConfig,
    engines: DashMap<String, Arc<Engine>>,
}

impl IndexRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_template(root, EngineConfig::default())
    }

    pub fn with_template(root: impl Into<PathBuf>, template: EngineConfig) -> Self {
        Self {
            root: root.into(),
            template,
            engines: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The engine for `name`, opening it if needed
    pub fn get_or_open(&self, name: &str) -> Result<Arc<Engine>> {
        validate_name(name)?;
        match self.engines.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let mut config = self.template.clone();
                config.name = name.to_string();
                config.data_dir = self.root.join(name);

                let engine = Arc::new(Engine::open(config)?);
                entry.insert(Arc::clone(&engine));
                tracing::info!(index = name, "Registered index");
                Ok(engine)
            }
        }
    }

    /// The engine for `name` if it is open
    pub fn get(&self, name: &str) -> Option<Arc<Engine>> {
        self.engines.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Sorted names of the open indexes
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Request a full compaction of an open index
    pub fn optimize(&self, name: &str) -> Result<()> {
        match self.get(name) {
            Some(engine) => engine.optimize(),
            None => Err(RtSearchError::InvalidConfig(format!("unknown index '{}'", name))),
        }
    }

    /// Shut an index down and forget it; returns false if it was not open
    pub fn close(&self, name: &str) -> Result<bool> {
        match self.engines.remove(name) {
            Some((_, engine)) => {
                engine.shutdown()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Shut every index down, returning the first failure
    ///
    /// Every index is attempted even if an earlier one fails.
    pub fn shutdown_all(&self) -> Result<()> {
        let mut first_error = None;
        for name in self.names() {
            if let Some((_, engine)) = self.engines.remove(&name) {
                if let Err(e) = engine.shutdown() {
                    tracing::error!(index = %name, error = %e, "Index shutdown failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Index names become directory names
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RtSearchError::InvalidConfig(format!("invalid index name '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("books").is_ok());
        assert!(validate_name("books-2024_v1.0").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
