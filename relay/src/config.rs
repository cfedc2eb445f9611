use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use storefront::types::StoreAccess;
use thiserror::Error;
use url::Url;

/// Upper bound for `sheet.max_attempts`.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Duplicate store domain: {0}")]
    DuplicateStore(String),

    #[error("Empty store domain")]
    EmptyStoreDomain,

    #[error("Branch {0} has an empty theme name")]
    EmptyThemeName(String),

    #[error("Branch {branch} targets unknown store {domain}")]
    UnknownStore { branch: String, domain: String },

    #[error("Sheet batch_size must be at least 1")]
    InvalidBatchSize,

    #[error("Sheet max_attempts must be between 1 and 10")]
    InvalidMaxAttempts,

    #[error("max_body_bytes must be at least 1")]
    InvalidBodyLimit,
}

#[derive(Error, Debug, PartialEq)]
pub enum CredentialsError {
    #[error("environment variable {0} is not set")]
    MissingVariable(String),
}

/// Relay configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for webhook and config requests
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    /// Environment variable holding the webhook signing secret
    pub github_secret_env: Option<String>,
    /// Pause between resolving the theme and reading its files, giving the
    /// storefront time to pick up the pushed commit
    #[serde(default = "default_fetch_delay_secs")]
    pub fetch_delay_secs: u64,
    /// Largest webhook body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// When off, pushes are acknowledged without syncing
    #[serde(default = "default_true")]
    pub sync_enabled: bool,
    /// When off, settings are never written back to a theme
    #[serde(default = "default_true")]
    pub theme_updates_enabled: bool,
    pub stores: Vec<StoreConfig>,
    /// Branch name to sync target. Order is kept for the config endpoint.
    pub branches: IndexMap<String, BranchConfig>,
    #[serde(default)]
    pub storefront: StorefrontConfig,
    /// Without a sheet, records are extracted and logged but not delivered.
    pub sheet: Option<SheetConfig>,
}

fn default_fetch_delay_secs() -> u64 {
    5
}

fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }

        let mut domains = HashSet::new();
        for store in &self.stores {
            if store.domain.is_empty() {
                return Err(ValidationError::EmptyStoreDomain);
            }
            if !domains.insert(store.domain.as_str()) {
                return Err(ValidationError::DuplicateStore(store.domain.clone()));
            }
        }

        for (branch, target) in &self.branches {
            if target.theme_name.is_empty() {
                return Err(ValidationError::EmptyThemeName(branch.clone()));
            }
            if !domains.contains(target.shopify_domain.as_str()) {
                return Err(ValidationError::UnknownStore {
                    branch: branch.clone(),
                    domain: target.shopify_domain.clone(),
                });
            }
        }

        if let Some(sheet) = &self.sheet {
            sheet.validate()?;
        }

        Ok(())
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_secs(self.fetch_delay_secs)
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// A store and the environment variable holding its Admin API token.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub domain: String,
    pub access_token_env: String,
}

/// Where the pushes of one branch are synced to.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BranchConfig {
    /// Name the sheet files the records under
    pub store_name: String,
    pub shopify_domain: String,
    /// Theme name as configured by people; resolved against the store's themes
    pub theme_name: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorefrontConfig {
    pub api_version: String,
    pub timeout_secs: u64,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        StorefrontConfig {
            api_version: storefront::client::DEFAULT_API_VERSION.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SheetConfig {
    pub url: Url,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

impl SheetConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ValidationError::InvalidMaxAttempts);
        }
        Ok(())
    }
}

/// Secrets referenced by the config, resolved once at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    pub github_secret: Option<String>,
    tokens: HashMap<String, String>,
}

impl Credentials {
    /// Resolves every variable named in `config` through `lookup`.
    ///
    /// A missing store token is an error. A missing webhook secret is not:
    /// every webhook is then rejected as unauthenticated.
    pub fn from_lookup<F>(config: &Config, lookup: F) -> Result<Self, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let github_secret = config.github_secret_env.as_deref().and_then(&lookup);

        let mut tokens = HashMap::new();
        for store in &config.stores {
            let token = lookup(&store.access_token_env)
                .ok_or_else(|| CredentialsError::MissingVariable(store.access_token_env.clone()))?;
            tokens.insert(store.domain.clone(), token);
        }

        Ok(Credentials {
            github_secret,
            tokens,
        })
    }

    pub fn from_env(config: &Config) -> Result<Self, CredentialsError> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    pub fn with_token(mut self, domain: &str, token: &str) -> Self {
        self.tokens.insert(domain.to_string(), token.to_string());
        self
    }

    pub fn access_token(&self, domain: &str) -> Option<&str> {
        self.tokens.get(domain).map(String::as_str)
    }

    /// Admin API access for `domain`, if a token was configured for it.
    pub fn store_access(&self, domain: &str) -> Option<StoreAccess> {
        self.access_token(domain).map(|token| StoreAccess {
            domain: domain.to_string(),
            access_token: token.to_string(),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut domains: Vec<&String> = self.tokens.keys().collect();
        domains.sort();
        f.debug_struct("Credentials")
            .field("github_secret", &self.github_secret.as_ref().map(|_| "<redacted>"))
            .field("stores", &domains)
            .finish()
    }
}
