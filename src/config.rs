//! Session configuration
//!
//! The storage root is the only setting that reaches the core from the
//! process boundary; everything else is per-query [`SeriesOptions`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::transform::SeriesOptions;
use crate::{Error, Result};

/// Highest accepted smoothing level.
pub const MAX_SMOOTHING: u8 = 20;

/// Point budget used when the presentation layer asks for downsampling.
pub const DEFAULT_MAX_POINTS: usize = 1000;

/// Database stems that belong to the logging side, not to projects.
pub const RESERVED_DATABASES: [&str; 2] = ["_global", "_cache"];

/// Environment variable overriding the storage root.
pub const STORAGE_ROOT_ENV: &str = "TRACKIO_DIR";

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    storage_root: PathBuf,
    default_options: SeriesOptions,
}

impl Config {
    /// Create a configuration rooted at `storage_root` with default options.
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            default_options: SeriesOptions::default(),
        }
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from the environment.
    ///
    /// `TRACKIO_DIR` wins; otherwise `$HOME/.cache/huggingface/trackio`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when neither `TRACKIO_DIR` nor `HOME` is set.
    pub fn from_env() -> Result<Self> {
        Self::builder().build()
    }

    /// Directory holding `<project>.db` files.
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Chart options used before the user changes any control.
    #[must_use]
    pub const fn default_options(&self) -> &SeriesOptions {
        &self.default_options
    }

    /// Path of the database backing `project`.
    #[must_use]
    pub fn database_path(&self, project: &str) -> PathBuf {
        database_path(&self.storage_root, project)
    }
}

/// Path of the database for `project` under `root`.
#[must_use]
pub fn database_path(root: &Path, project: &str) -> PathBuf {
    root.join(format!("{project}.db"))
}

/// Default storage root derived from the environment.
///
/// # Errors
///
/// Returns [`Error::Config`] when neither `TRACKIO_DIR` nor `HOME` is set.
pub fn default_storage_root() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(STORAGE_ROOT_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| {
            PathBuf::from(home)
                .join(".cache")
                .join("huggingface")
                .join("trackio")
        })
        .ok_or_else(|| {
            Error::Config(format!(
                "cannot locate storage root: set {STORAGE_ROOT_ENV} or HOME"
            ))
        })
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    storage_root: Option<PathBuf>,
    default_options: Option<SeriesOptions>,
}

impl ConfigBuilder {
    /// Set the storage root explicitly.
    #[must_use]
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    /// Set the initial chart options.
    #[must_use]
    pub fn default_options(mut self, options: SeriesOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    /// Build the configuration, resolving the storage root from the
    /// environment when none was given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no storage root can be resolved.
    pub fn build(self) -> Result<Config> {
        let storage_root = match self.storage_root {
            Some(root) => root,
            None => default_storage_root()?,
        };
        Ok(Config {
            storage_root,
            default_options: self.default_options.unwrap_or_default(),
        })
    }
}
