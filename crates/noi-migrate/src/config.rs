//! `noi.toml` configuration.
//!
//! ```toml
//! [site]
//! current_version = "2016.12.0"
//! languages = ["en", "de", "fr"]
//! plugins = ["topics", "votes", "deploy"]
//! partner_model = "contacts.partner"
//!
//! [content_types]
//! 17 = "tickets.ticket"
//!
//! [choices."tickets.TicketStates"]
//! "10" = "new"
//! "20" = "todo"
//! ```
//!
//! Every section is optional; omitted values fall back to the defaults of
//! the current Noi release.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::version::SchemaVersion;

/// Choice list holding ticket workflow states.
pub const TICKET_STATES: &str = "tickets.TicketStates";

/// Error loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NoiConfig {
    pub site: SiteConfig,
    /// Legacy content-type id to current model name.
    pub content_types: BTreeMap<String, String>,
    /// Choice list name to (code → symbolic name). Lists given here replace
    /// the built-in list of the same name.
    pub choices: BTreeMap<String, BTreeMap<String, String>>,
}

/// Properties of the site the dump is imported into.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Schema version of the running application.
    pub current_version: SchemaVersion,
    /// Site languages; the first one is the default language.
    pub languages: Vec<String>,
    /// Installed optional plugins.
    pub plugins: BTreeSet<String>,
    /// Model that interests point to.
    pub partner_model: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            current_version: default_current_version(),
            languages: vec!["en".to_string()],
            plugins: ["topics", "votes", "deploy"]
                .into_iter()
                .map(String::from)
                .collect(),
            partner_model: "contacts.partner".to_string(),
        }
    }
}

impl SiteConfig {
    pub fn is_installed(&self, plugin: &str) -> bool {
        self.plugins.contains(plugin)
    }
}

fn default_current_version() -> SchemaVersion {
    SchemaVersion::from_components(&[2016, 12, 0])
}

impl NoiConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.site.languages.is_empty() {
            return Err(ConfigError::Invalid(
                "site.languages must name at least one language".into(),
            ));
        }
        if self.site.partner_model.is_empty() {
            return Err(ConfigError::Invalid(
                "site.partner_model must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Built-in choice lists overlaid with the configured ones.
    pub fn choice_lists(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut lists = default_choice_lists();
        for (name, codes) in &self.choices {
            lists.insert(name.clone(), codes.clone());
        }
        lists
    }
}

/// Choice lists of the current release.
pub fn default_choice_lists() -> BTreeMap<String, BTreeMap<String, String>> {
    let states = [
        ("10", "new"),
        ("15", "talk"),
        ("20", "todo"),
        ("21", "sticky"),
        ("30", "sleeping"),
        ("40", "ready"),
        ("50", "closed"),
        ("60", "cancelled"),
    ]
    .into_iter()
    .map(|(code, name)| (code.to_string(), name.to_string()))
    .collect();
    BTreeMap::from([(TICKET_STATES.to_string(), states)])
}
