//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (the CLI's `--config`)
//! 2. `~/.switchboard/config.toml` (user)
//! 3. `/etc/switchboard/config.toml` (system)
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.switchboard/secrets.toml` (user, must be 0600)
//! 2. `/etc/switchboard/secrets.toml` (system, must be 0600)
//!
//! Each `[[providers]]` entry may name an `api_key_env` variable, used when
//! the secrets file has no key for that provider.
//!
//! ```toml
//! [router]
//! default_policy = "balanced"
//! max_attempts = 3
//!
//! [[providers]]
//! name = "groq"
//! kind = "openai_compatible"
//! base_url = "https://api.groq.com/openai/v1"
//! model = "llama-3.3-70b-versatile"
//! api_key_env = "GROQ_API_KEY"
//! capabilities = { max_context_tokens = 131072, supports_tools = true }
//! pricing = { input_per_1k = 0.00059, output_per_1k = 0.00079 }
//!
//! [[providers]]
//! name = "ollama"
//! kind = "ollama"
//! model = "llama3.2"
//!
//! [tasks.coding]
//! preferred = ["groq"]
//! requires_tools = true
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::cache::CacheConfig;
use crate::gateway::{FallbackConfig, SwitchboardBuilder};
use crate::performance::{DEFAULT_HISTORY_WINDOW, DEFAULT_QUARANTINE_THRESHOLD};
use crate::providers::{
    DEFAULT_OLLAMA_URL, OllamaAdapter, OpenAiCompatibleAdapter, ProviderMetadata, ProviderOptions,
};
use crate::routing::{RoutingConfig, RoutingPolicy, ScoringWeights, TaskCategory, TaskProfile};
use crate::types::{Deployment, Pricing, ProviderCapabilities, QualityTier};
use crate::{Result, SwitchboardError};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    /// Task profile overrides, keyed by category name.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskProfile>,
}

/// Router defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub default_policy: RoutingPolicy,
    pub fallback_enabled: bool,
    pub max_attempts: u32,
    pub quarantine_threshold: u32,
    pub history_window: usize,
    /// Per-attempt timeout in seconds.
    pub request_timeout_secs: u64,
    pub score_floor: f64,
    pub max_cost_per_request: Option<f64>,
    pub max_latency_ms: Option<u64>,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_policy: RoutingPolicy::default(),
            fallback_enabled: true,
            max_attempts: 3,
            quarantine_threshold: DEFAULT_QUARANTINE_THRESHOLD,
            history_window: DEFAULT_HISTORY_WINDOW,
            request_timeout_secs: 30,
            score_floor: ScoringWeights::default().score_floor,
            max_cost_per_request: None,
            max_latency_ms: None,
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

/// `[cache]` section. Disabled unless `enabled = true`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            enabled: false,
            max_entries: defaults.max_entries,
            ttl_secs: defaults.ttl.as_secs(),
        }
    }
}

/// Wire protocol of a configured provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST {base_url}/chat/completions` (Groq, DeepSeek, OpenAI, ...).
    OpenaiCompatible,
    /// Ollama's native `/api/chat`.
    Ollama,
}

/// One `[[providers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Defaults to `local` for Ollama and `cloud` otherwise.
    #[serde(default)]
    pub deployment: Option<Deployment>,
    #[serde(default)]
    pub quality: QualityTier,
    #[serde(default)]
    pub capabilities: ProviderCapabilities,
    #[serde(default)]
    pub pricing: Pricing,
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.switchboard/config.toml`
    /// 3. `/etc/switchboard/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            SwitchboardError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| match e {
            SwitchboardError::Configuration(msg) => {
                SwitchboardError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })
    }

    /// Parse and validate a config document.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| {
            SwitchboardError::Configuration(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(SwitchboardError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".switchboard").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/switchboard/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(SwitchboardError::Configuration(
            "No config file found. Create ~/.switchboard/config.toml or /etc/switchboard/config.toml"
                .to_string(),
        ))
    }

    fn validate(&self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.providers.len());
        for entry in &self.providers {
            if seen.contains(&entry.name.as_str()) {
                return Err(SwitchboardError::Configuration(format!(
                    "provider '{}' configured twice",
                    entry.name
                )));
            }
            seen.push(entry.name.as_str());
            if entry.kind == ProviderKind::OpenaiCompatible && entry.base_url.is_none() {
                return Err(SwitchboardError::Configuration(format!(
                    "provider '{}' needs a base_url",
                    entry.name
                )));
            }
        }
        for key in self.tasks.keys() {
            key.parse::<TaskCategory>().map_err(|_| {
                SwitchboardError::Configuration(format!("unknown task category '{key}'"))
            })?;
        }
        Ok(())
    }

    /// Routing defaults from `[router]`.
    pub fn routing_defaults(&self) -> RoutingConfig {
        let router = &self.router;
        RoutingConfig {
            policy: router.default_policy,
            max_cost_per_request: router.max_cost_per_request,
            max_latency_ms: router.max_latency_ms,
            allow: router.allow.clone(),
            deny: router.deny.clone(),
            fallback_enabled: router.fallback_enabled,
            ..RoutingConfig::default()
        }
    }

    pub fn fallback(&self) -> FallbackConfig {
        FallbackConfig::new()
            .enabled(self.router.fallback_enabled)
            .max_attempts(self.router.max_attempts)
            .attempt_timeout(Duration::from_secs(self.router.request_timeout_secs))
    }

    /// A builder with every configured provider registered.
    ///
    /// Providers whose `api_key_env` is set but whose key cannot be
    /// resolved are registered disabled.
    pub fn into_builder(self, secrets: &Secrets) -> Result<SwitchboardBuilder> {
        let mut builder = SwitchboardBuilder::new()
            .routing_defaults(self.routing_defaults())
            .fallback(self.fallback())
            .history_window(self.router.history_window)
            .quarantine_threshold(self.router.quarantine_threshold)
            .scoring_weights(ScoringWeights {
                score_floor: self.router.score_floor,
                ..ScoringWeights::default()
            });

        for (key, profile) in self.tasks {
            let category = key.parse::<TaskCategory>().map_err(|_| {
                SwitchboardError::Configuration(format!("unknown task category '{key}'"))
            })?;
            builder = builder.task_profile(category, profile);
        }

        if self.cache.enabled {
            builder = builder.response_cache(
                CacheConfig::new()
                    .max_entries(self.cache.max_entries)
                    .ttl(Duration::from_secs(self.cache.ttl_secs)),
            );
        }

        for entry in self.providers {
            builder = entry.register(builder, secrets)?;
        }
        Ok(builder)
    }
}

impl ProviderEntry {
    fn register(self, builder: SwitchboardBuilder, secrets: &Secrets) -> Result<SwitchboardBuilder> {
        let deployment = self.deployment.unwrap_or(match self.kind {
            ProviderKind::Ollama => Deployment::Local,
            ProviderKind::OpenaiCompatible => Deployment::Cloud,
        });
        let metadata = ProviderMetadata::new(&self.model)
            .capabilities(self.capabilities)
            .pricing(self.pricing)
            .deployment(deployment)
            .quality(self.quality);

        let api_key = secrets.api_key(&self.name, self.api_key_env.as_deref());
        let mut enabled = self.enabled;
        if let Some(var) = &self.api_key_env
            && api_key.is_none()
        {
            warn!(
                provider = %self.name,
                env = %var,
                "no API key found, registering provider disabled"
            );
            enabled = false;
        }

        let mut options = ProviderOptions::new().enabled(enabled);
        if let Some(priority) = self.priority {
            options = options.priority(priority);
        }

        let builder = match self.kind {
            ProviderKind::OpenaiCompatible => {
                let base_url = self.base_url.ok_or_else(|| {
                    SwitchboardError::Configuration(format!(
                        "provider '{}' needs a base_url",
                        self.name
                    ))
                })?;
                let mut adapter = OpenAiCompatibleAdapter::new(&self.name, base_url, &self.model)?
                    .with_metadata(metadata);
                if let Some(key) = api_key {
                    adapter = adapter.api_key(key);
                }
                builder.provider(adapter, options)
            }
            ProviderKind::Ollama => {
                let base_url = self
                    .base_url
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
                let adapter =
                    OllamaAdapter::new(&self.name, base_url, &self.model)?.with_metadata(metadata);
                builder.provider(adapter, options)
            }
        };
        Ok(builder)
    }
}

/// API keys, keyed by provider name.
///
/// ```toml
/// [groq]
/// api_key = "gsk-..."
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secrets {
    keys: HashMap<String, ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.switchboard/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/switchboard/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (providers may use env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".switchboard").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/switchboard/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a specific secrets file, enforcing permissions.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            SwitchboardError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            SwitchboardError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            SwitchboardError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(SwitchboardError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    pub fn insert(&mut self, provider: impl Into<String>, api_key: impl Into<String>) {
        self.keys.insert(
            provider.into(),
            ApiKeySecret {
                api_key: api_key.into(),
            },
        );
    }

    /// Key for `provider` from the secrets file, else from `env_var`.
    pub fn api_key(&self, provider: &str, env_var: Option<&str>) -> Option<String> {
        self.keys
            .get(provider)
            .map(|s| s.api_key.clone())
            .or_else(|| env_var.and_then(|var| std::env::var(var).ok()))
            .filter(|key| !key.is_empty())
    }
}
