//! Bootstrap sources used to seed the toggle store before the first fetch.

use std::path::PathBuf;

use crate::error::{ErrorCode, Result, UnleashError};
use crate::types::{FeatureResponse, Toggle};

#[derive(Debug, Clone)]
pub enum Bootstrap {
    /// Toggles supplied in code.
    Toggles(Vec<Toggle>),
    /// Path to a JSON file shaped like a fetch response (`{"toggles": [...]}`).
    JsonFile(PathBuf),
    /// JSON text shaped like a fetch response, e.g. from `include_str!`.
    Json(String),
}

impl Default for Bootstrap {
    fn default() -> Self {
        Bootstrap::Toggles(Vec::new())
    }
}

impl Bootstrap {
    /// Load the toggles, failing on unreadable or malformed sources.
    pub fn load(&self) -> Result<Vec<Toggle>> {
        match self {
            Bootstrap::Toggles(toggles) => Ok(toggles.clone()),
            Bootstrap::JsonFile(path) => {
                let data = std::fs::read_to_string(path).map_err(|e| {
                    UnleashError::with_source(
                        ErrorCode::BootstrapLoadFailed,
                        format!("Could not read bootstrap file {}", path.display()),
                        e,
                    )
                })?;
                Self::parse(&data)
            }
            Bootstrap::Json(data) => Self::parse(data),
        }
    }

    /// Load the toggles, logging a warning and falling back to an empty list
    /// when the source cannot be loaded.
    pub fn toggles(&self) -> Vec<Toggle> {
        match self.load() {
            Ok(toggles) => toggles,
            Err(e) => {
                tracing::warn!("{}. Using empty bootstrap.", e);
                Vec::new()
            }
        }
    }

    fn parse(data: &str) -> Result<Vec<Toggle>> {
        let response: FeatureResponse = serde_json::from_str(data).map_err(|e| {
            UnleashError::with_source(
                ErrorCode::BootstrapLoadFailed,
                format!("Could not decode bootstrap toggles: {}", e),
                e,
            )
        })?;
        Ok(response.toggles)
    }
}

impl From<Vec<Toggle>> for Bootstrap {
    fn from(toggles: Vec<Toggle>) -> Self {
        Bootstrap::Toggles(toggles)
    }
}
