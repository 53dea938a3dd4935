use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use relwatch_api::{
    HttpConfig, DEFAULT_BLOG_URL, DEFAULT_FEED_URL, GITHUB_API_BASE, LINEAR_API_URL,
    NPM_REGISTRY, OPENAI_API_BASE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::models::ReleaseContext;
use crate::registry::SourceGroup;
use crate::sources::FetchContext;
use crate::{Error, Result};

/// Overrides `environment` from the config file
pub const ENV_VAR: &str = "RELWATCH_ENV";

/// Main configuration structure
///
/// Loaded once at startup and never touched again. Every `[[sources]]`
/// group has to resolve, otherwise loading fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub linear: LinearConfig,

    #[serde(default)]
    pub sources: Vec<SourceGroup>,
}

impl Config {
    /// Load config from the default location, or defaults if there is none
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            debug!("No config at {}, using defaults", config_path.display());
            let mut config = Self::default();
            config.apply_env_override(std::env::var(ENV_VAR).ok().as_deref())?;
            Ok(config)
        }
    }

    /// Load config from an explicit path; the file has to exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_override(std::env::var(ENV_VAR).ok().as_deref())?;
        info!(
            "Loaded {} source groups from {}",
            config.sources.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parse and validate, without looking at the process environment
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::ConfigError("Could not find config directory".into()))?
            .join("relwatch");

        Ok(config_dir.join("config.toml"))
    }

    fn apply_env_override(&mut self, value: Option<&str>) -> Result<()> {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.environment = value.parse()?;
        }
        Ok(())
    }

    /// Every group must resolve to a known kind with a usable target
    pub fn validate(&self) -> Result<()> {
        if self.aggregation.max_releases == 0 {
            return Err(Error::ConfigError(
                "aggregation.max_releases must be at least 1".into(),
            ));
        }
        for group in &self.sources {
            if group.label.trim().is_empty() {
                return Err(Error::ConfigError("Source group without a label".into()));
            }
            group.resolve()?;
        }
        Ok(())
    }

    /// Plumbing handed to every fetcher
    pub fn fetch_context(&self, clock: Arc<dyn Clock>) -> FetchContext {
        FetchContext {
            http: self.http.to_http_config(),
            endpoints: self.endpoints.clone(),
            environment: self.environment,
            clock,
        }
    }

    /// Repo substrings excluded from a context
    pub fn excludes(&self, context: ReleaseContext) -> &[String] {
        match context {
            ReleaseContext::Releases => &self.aggregation.exclude_from_releases,
            ReleaseContext::Summary => &self.aggregation.exclude_from_summary,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            other => Err(Error::ConfigError(format!("Unknown environment '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("relwatch/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpSettings {
    pub fn to_http_config(&self) -> HttpConfig {
        HttpConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Inline value if set, else the named environment variable. Blank is unset.
fn resolve_secret(inline: Option<&str>, env_var: &str) -> Option<String> {
    let present = |v: &str| !v.trim().is_empty();
    inline
        .filter(|v| present(v))
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok().filter(|v| present(v)))
}

/// Chat model used for the weekly summaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_model")]
    pub model: String,

    /// Model for the Linear digest
    #[serde(default = "default_linear_model")]
    pub linear_model: String,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_ai_key_env")]
    pub api_key_env: String,
}

fn default_ai_model() -> String {
    "gpt-4-turbo".to_string()
}

fn default_linear_model() -> String {
    "gpt-4.1".to_string()
}

fn default_ai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_ai_model(),
            linear_model: default_linear_model(),
            api_key: None,
            api_key_env: default_ai_key_env(),
        }
    }
}

impl AiConfig {
    pub fn api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_linear_key_env")]
    pub api_key_env: String,
}

fn default_linear_key_env() -> String {
    "LINEAR_API_KEY".to_string()
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_linear_key_env(),
        }
    }
}

impl LinearConfig {
    pub fn api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), &self.api_key_env)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Releases kept after the merge
    #[serde(default = "default_max_releases")]
    pub max_releases: usize,

    /// Deadline for one fetch unit, all its pages included
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Repo substrings hidden from the public release list
    #[serde(default)]
    pub exclude_from_releases: Vec<String>,

    /// Repo substrings left out of the weekly summary
    #[serde(default = "default_summary_excludes")]
    pub exclude_from_summary: Vec<String>,
}

fn default_max_releases() -> usize {
    35
}

fn default_source_timeout() -> u64 {
    60
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_summary_excludes() -> Vec<String> {
    vec!["onmax/".to_string()]
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_releases: default_max_releases(),
            source_timeout_secs: default_source_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            exclude_from_releases: Vec::new(),
            exclude_from_summary: default_summary_excludes(),
        }
    }
}

impl AggregationConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}

/// Upstream base URLs. Only tests and mirrors change these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_github_api")]
    pub github_api: String,

    #[serde(default = "default_npm_registry")]
    pub npm_registry: String,

    #[serde(default = "default_release_feed")]
    pub release_feed: String,

    #[serde(default = "default_blog_url")]
    pub blog_url: String,

    #[serde(default = "default_openai_api")]
    pub openai_api: String,

    #[serde(default = "default_linear_api")]
    pub linear_api: String,
}

fn default_github_api() -> String {
    GITHUB_API_BASE.to_string()
}

fn default_npm_registry() -> String {
    NPM_REGISTRY.to_string()
}

fn default_release_feed() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_blog_url() -> String {
    DEFAULT_BLOG_URL.to_string()
}

fn default_openai_api() -> String {
    OPENAI_API_BASE.to_string()
}

fn default_linear_api() -> String {
    LINEAR_API_URL.to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            github_api: default_github_api(),
            npm_registry: default_npm_registry(),
            release_feed: default_release_feed(),
            blog_url: default_blog_url(),
            openai_api: default_openai_api(),
            linear_api: default_linear_api(),
        }
    }
}
