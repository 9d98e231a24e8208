//! Grid registry loader.
//!
//! Loads grid configurations from YAML and indexes them by grid id. The
//! registry is built once at startup and shared read-only afterwards.

use indexmap::IndexMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::{GridConfig, GridSummary};
use crate::error::{GridError, GridResult};

/// Grids bundled with the crate, used when no config file is given
const BUILTIN_GRIDS: &str = include_str!("../../config/grids.yaml");

/// Read-only map from grid id to configuration, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct GridRegistry {
    grids: IndexMap<String, Arc<GridConfig>>,
}

impl GridRegistry {
    /// Registry with the bundled grid definitions.
    pub fn builtin() -> GridResult<Self> {
        Self::from_yaml_str(BUILTIN_GRIDS)
    }

    /// Load grid configurations from a YAML file.
    ///
    /// The file holds a top-level `grids` map keyed by grid id:
    ///
    /// ```yaml
    /// grids:
    ///   employees:
    ///     id: employees
    ///     name: Employees
    ///     dataSource: { type: mysql, connection: { table: employees, primaryKey: id } }
    ///     columns: [...]
    /// ```
    ///
    /// # Errors
    /// Returns a `Config` error if the file is missing, is not valid YAML, or
    /// contains a grid that fails validation.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> GridResult<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|e| {
            GridError::Config(format!("Failed to read grid config {}: {}", path.display(), e))
        })?;

        let registry = Self::from_yaml_str(&contents)?;
        tracing::info!(
            "Loaded {} grid configuration(s) from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn from_yaml_str(contents: &str) -> GridResult<Self> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(contents)
            .map_err(|e| GridError::Config(format!("Failed to parse YAML: {}", e)))?;

        let grids_yaml = yaml
            .get("grids")
            .ok_or_else(|| GridError::Config("Config missing 'grids' field".to_string()))?;

        let grids: IndexMap<String, GridConfig> = serde_yaml::from_value(grids_yaml.clone())
            .map_err(|e| GridError::Config(format!("Failed to parse grids: {}", e)))?;

        for (key, config) in &grids {
            if key != &config.id {
                return Err(GridError::Config(format!(
                    "Grid registered under '{}' declares id '{}'",
                    key, config.id
                )));
            }
        }

        Self::from_configs(grids.into_values())
    }

    /// Build a registry from already-parsed configs, validating each one.
    pub fn from_configs<I>(configs: I) -> GridResult<Self>
    where
        I: IntoIterator<Item = GridConfig>,
    {
        let mut grids = IndexMap::new();
        for config in configs {
            config.validate()?;
            if grids.contains_key(&config.id) {
                return Err(GridError::Config(format!(
                    "Grid id '{}' is registered more than once",
                    config.id
                )));
            }
            grids.insert(config.id.clone(), Arc::new(config));
        }
        Ok(Self { grids })
    }

    pub fn get(&self, grid_id: &str) -> Option<Arc<GridConfig>> {
        self.grids.get(grid_id).cloned()
    }

    pub fn contains(&self, grid_id: &str) -> bool {
        self.grids.contains_key(grid_id)
    }

    pub fn configs(&self) -> impl Iterator<Item = &Arc<GridConfig>> {
        self.grids.values()
    }

    pub fn summaries(&self) -> Vec<GridSummary> {
        self.grids.values().map(|c| c.summary()).collect()
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}
