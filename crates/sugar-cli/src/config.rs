//! Configuration loading.
//!
//! Settings come from `sugar.toml` in the template root; command line flags
//! override them. Every key is optional.

use crate::cli::Args;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;
use sugar_compiler::{CompilerConfig, DEFAULT_SUFFIX};
use thiserror::Error;

/// Name of the configuration file looked up in the template root.
pub const CONFIG_FILE: &str = "sugar.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("invalid {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SugarConfig {
    /// Template file suffix.
    pub suffix: String,
    /// Directive attribute prefix.
    pub directive_prefix: String,
    /// Non-rendering wrapper tag.
    pub fragment_tag: String,
    /// Component tag prefix.
    pub component_prefix: String,
    /// Component directories, relative to the root.
    pub component_dirs: Vec<Utf8PathBuf>,
    /// Where compiled templates are written, relative to the root.
    pub cache_dir: Utf8PathBuf,
    /// Glob patterns of templates to skip.
    pub ignore: Vec<String>,
}

impl Default for SugarConfig {
    fn default() -> Self {
        let compiler = CompilerConfig::default();
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
            directive_prefix: compiler.directive_prefix.to_string(),
            fragment_tag: compiler.fragment_tag.to_string(),
            component_prefix: compiler.component_prefix.to_string(),
            component_dirs: vec![Utf8PathBuf::from("components")],
            cache_dir: Utf8PathBuf::from(".sugar-cache"),
            ignore: Vec::new(),
        }
    }
}

impl SugarConfig {
    /// Loads the configuration for `root`.
    ///
    /// An explicit path must exist; a missing `sugar.toml` in the root means
    /// defaults.
    pub fn load(root: &Utf8Path, explicit: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = root.join(CONFIG_FILE);
                if !path.is_file() {
                    tracing::debug!(%root, "no {CONFIG_FILE}, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(%path, "loaded configuration");
        Ok(config)
    }

    /// Parses `sugar.toml` content.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Applies command line overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(suffix) = &args.suffix {
            self.suffix = suffix.clone();
        }
        if let Some(out) = &args.out {
            self.cache_dir = out.clone();
        }
        self.ignore.extend(args.ignore.iter().cloned());
    }

    /// Returns the compiler syntax settings.
    pub fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig {
            directive_prefix: self.directive_prefix.as_str().into(),
            fragment_tag: self.fragment_tag.as_str().into(),
            component_prefix: self.component_prefix.as_str().into(),
            suffix: self.suffix.clone(),
        }
    }

    /// Returns the cache directory resolved against `root`.
    pub fn cache_dir(&self, root: &Utf8Path) -> Utf8PathBuf {
        if self.cache_dir.is_absolute() {
            self.cache_dir.clone()
        } else {
            root.join(&self.cache_dir)
        }
    }
}
