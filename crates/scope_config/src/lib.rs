use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// File name looked up by [`ScopeSyncConfig::load_from_dir`].
pub const CONFIG_FILE_NAME: &str = ".scopesync.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid binding '{binding}': {reason}")]
    InvalidBinding { binding: String, reason: String },

    #[error("Duplicate binding name '{0}'")]
    DuplicateBinding(String),
}

/// Which scope collection of a parent is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingKind {
    /// Default scopes every new client of a realm receives
    RealmDefault,
    /// Optional scopes every new client of a realm receives
    RealmOptional,
    /// Default scopes attached to one client
    ClientDefault,
    /// Optional scopes attached to one client
    ClientOptional,
}

impl BindingKind {
    pub const ALL: [BindingKind; 4] = [
        BindingKind::RealmDefault,
        BindingKind::RealmOptional,
        BindingKind::ClientDefault,
        BindingKind::ClientOptional,
    ];

    /// Client kinds are scoped by realm + client, realm kinds by realm alone.
    pub fn is_client_scoped(self) -> bool {
        matches!(self, Self::ClientDefault | Self::ClientOptional)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RealmDefault => "realm-default",
            Self::RealmOptional => "realm-optional",
            Self::ClientDefault => "client-default",
            Self::ClientOptional => "client-optional",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown binding kind '{}'", s))
    }
}

/// Polling settings used after a reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Maximum number of polls before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between two polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Treat an exhausted polling budget as an error instead of a warning
    #[serde(default)]
    pub fail_on_exhausted: bool,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            fail_on_exhausted: false,
        }
    }
}

impl ConvergenceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// A declared scope binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSpec {
    /// Name of the binding (used in output only)
    pub name: String,
    /// Scope collection to reconcile
    pub kind: BindingKind,
    /// Realm the binding lives in
    pub realm: String,
    /// Client id, required for client kinds
    #[serde(default)]
    pub client: Option<String>,
    /// Declared scope names
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl BindingSpec {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBinding {
            binding: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.realm.is_empty() {
            return Err(invalid("realm must not be empty"));
        }
        match (&self.client, self.kind.is_client_scoped()) {
            (None, true) => Err(invalid("client kinds require a client")),
            (Some(_), false) => Err(invalid("realm kinds must not name a client")),
            (Some(c), true) if c.is_empty() => Err(invalid("client must not be empty")),
            _ => Ok(()),
        }
    }
}

/// Contents of `.scopesync.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSyncConfig {
    #[serde(default)]
    pub convergence: ConvergenceConfig,
    #[serde(default, rename = "binding")]
    pub bindings: Vec<BindingSpec>,
}

impl ScopeSyncConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        Self::load(&dir.join(CONFIG_FILE_NAME))
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ScopeSyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for binding in &self.bindings {
            binding.validate()?;
            if !seen.insert(binding.name.as_str()) {
                return Err(ConfigError::DuplicateBinding(binding.name.clone()));
            }
        }
        Ok(())
    }
}
