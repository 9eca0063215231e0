//! Layered configuration and typed settings.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_INDEX__NAME`).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use crate::dimensions::ContentDimensions;
use crate::error::{Error, Result};
use crate::link::LinkSettings;
use crate::schema::{NodeTypeDefinition, NodeTypeRegistry};
use crate::types::{NodeTypeName, WorkspaceName};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit TOML file instead of the working directory.
    pub fn load_file(path: &std::path::Path) -> Result<Self> {
        let config = Self { figment: Figment::new().merge(Toml::file(path)).merge(Env::prefixed("APP_").split("__")) };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Self { figment: Figment::new().merge(Toml::string(toml)) };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// The full typed settings; missing sections fall back to defaults.
    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(format!("Failed to read settings: {}", e)))
    }

    fn validate(&self) -> Result<()> {
        let settings = self.settings()?;
        if settings.index.name.trim().is_empty() {
            return Err(Error::InvalidConfig("index.name must not be empty".to_string()));
        }
        // surfaces inheritance cycles and unknown supertypes at load time
        settings.node_type_registry()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub name: String,
    /// On-disk location for embedded backends; `~` and `$VAR` are expanded.
    pub path: String,
}

impl Default for IndexSettings {
    fn default() -> Self { Self { name: "neos".to_string(), path: "data/index".to_string() } }
}

impl IndexSettings {
    pub fn resolved_path(&self) -> PathBuf { expand_path(&self.path) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    pub workspace: WorkspaceName,
    pub fulltext_enabled: bool,
    /// Node types (and their subtypes) the fulltext aggregation descends into.
    pub content_node_types: Vec<NodeTypeName>,
    /// Document attributes that must be non-empty for a document to be kept.
    pub required_attributes: Vec<String>,
    pub title_property: String,
    /// Field that is moved to `_geo` before a document is written.
    pub geo_field: String,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            workspace: WorkspaceName::live(),
            fulltext_enabled: true,
            content_node_types: vec![
                NodeTypeName::new("Neos.Neos:Content"),
                NodeTypeName::new("Neos.Neos:ContentCollection"),
            ],
            required_attributes: Vec::new(),
            title_property: "title".to_string(),
            geo_field: "__geo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub indexing: IndexingSettings,
    pub links: LinkSettings,
    pub dimensions: ContentDimensions,
    pub node_types: BTreeMap<String, NodeTypeDefinition>,
}

impl Settings {
    pub fn node_type_registry(&self) -> Result<NodeTypeRegistry> { NodeTypeRegistry::from_definitions(&self.node_types) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
