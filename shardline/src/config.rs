//! Storage configuration.
//!
//! A [`StorageConfig`] names the shard path template and the precision values
//! are written at. It is usually built in code or loaded from a JSON file:
//!
//! ```json
//! {
//!   "template": "{{Year .Epoch}}/{{Doy .Epoch}}/{{.Source}}.csv",
//!   "decimal_places": 3
//! }
//! ```
//!
//! Missing fields take their defaults. A negative `decimal_places` selects
//! the shortest round-trippable text.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{CsvCodec, Precision};
use crate::error::{ConfigError, Result};
use crate::template::ShardRouter;

/// Default shard path template: one file per source per UTC hour.
pub const DEFAULT_TEMPLATE: &str = "{{Year .Epoch}}/{{Year .Epoch}}.{{Doy .Epoch}}/{{Year .Epoch}}.{{Doy .Epoch}}.{{Hour .Epoch}}.{{.Source}}.csv";

/// Configuration for a [`Storage`](crate::Storage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Shard path template, relative to the store root.
    pub template: String,

    /// Precision used when writing values.
    pub decimal_places: Precision,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            decimal_places: Precision::Shortest,
        }
    }
}

impl StorageConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`](crate::error::TemplateError) if the template
    /// does not compile.
    pub fn new(template: impl Into<String>, decimal_places: Precision) -> Result<Self> {
        let config = Self {
            template: template.into(),
            decimal_places,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or a
    /// template error if the template does not compile.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the template compiles against the standard functions.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`](crate::error::TemplateError) if it does not.
    pub fn validate(&self) -> Result<()> {
        self.router().map(|_| ())
    }

    /// Builds the shard router for this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`](crate::error::TemplateError) if the template
    /// does not compile.
    pub fn router(&self) -> Result<ShardRouter> {
        ShardRouter::standard(&self.template)
    }

    /// The codec writing at this configuration's precision.
    pub fn codec(&self) -> CsvCodec {
        CsvCodec::new(self.decimal_places)
    }
}
