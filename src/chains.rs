//! YAML chain definition file.
//!
//! The file is re-read by every worker iteration through the `ConfigSource`
//! seam, so edits take effect within one iteration without a restart or a
//! reload signal. A file that fails to read or parse pauses consumption with
//! an error log until it is fixed; it never crashes the service.

use std::{collections::HashMap, future::Future, path::PathBuf, pin::Pin};

use chainline_core::{ChainConfig, ChainSnapshot, ConfigSource, CoreError, LinkOptions};
use serde::Deserialize;

/// Top-level structure of the chain definition file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainFile {
    /// Explicit per-link invocation options, merged over each link's
    /// defaults. Read once at startup.
    #[serde(default)]
    pub link_options: HashMap<String, LinkOptions>,

    /// Chain definitions.
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

impl ChainFile {
    /// Parses the file contents.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed YAML.
    pub fn parse(contents: &str) -> chainline_core::Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| CoreError::Configuration(format!("invalid chain file: {e}")))
    }
}

/// Config source backed by a YAML file on disk.
pub struct YamlFileSource {
    path: PathBuf,
}

impl YamlFileSource {
    /// Creates a source reading from the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads and parses the whole file, including link options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub async fn read(&self) -> chainline_core::Result<ChainFile> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CoreError::Configuration(format!(
                "cannot read chain file {}: {e}",
                self.path.display()
            ))
        })?;
        ChainFile::parse(&contents)
    }
}

impl ConfigSource for YamlFileSource {
    fn load(&self) -> Pin<Box<dyn Future<Output = chainline_core::Result<ChainSnapshot>> + Send + '_>>
    {
        Box::pin(async move {
            let file = self.read().await?;
            Ok(ChainSnapshot::new(file.chains))
        })
    }
}
