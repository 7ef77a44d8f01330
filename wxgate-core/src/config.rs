use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

use crate::provider::{Capability, ProviderId, http};

/// Per-provider overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Replaces the provider's public endpoint, e.g. for a proxy or a mock.
    pub base_url: Option<String>,
}

/// Cache namespace, backend and lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub prefix: String,
    /// Use Redis at this URL; the in-process store is used when unset.
    pub redis_url: Option<String>,
    pub current_ttl_secs: u64,
    pub forecast_ttl_secs: u64,
    pub alerts_ttl_secs: u64,
    pub location_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "wxgate".to_string(),
            redis_url: None,
            current_ttl_secs: 10 * 60,
            forecast_ttl_secs: 30 * 60,
            alerts_ttl_secs: 5 * 60,
            location_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Sent with every upstream request. NWS asks for contact details here.
    pub user_agent: Option<String>,

    pub timeout_secs: Option<u64>,

    /// Provider id, e.g. "nws".
    pub default_weather_provider: Option<String>,

    /// Provider id, e.g. "census".
    pub default_geocode_provider: Option<String>,

    /// Example TOML:
    /// [providers.nws]
    /// base_url = "https://api.weather.gov"
    pub providers: HashMap<String, ProviderConfig>,

    pub cache: CacheConfig,
}

impl Config {
    /// The default provider for `capability`. Falls back to the first known
    /// provider with that capability when nothing is configured.
    pub fn default_provider_id(&self, capability: Capability) -> Result<ProviderId> {
        let configured = match capability {
            Capability::Weather => self.default_weather_provider.as_ref(),
            Capability::Geocode => self.default_geocode_provider.as_ref(),
        };

        match configured {
            Some(s) => ProviderId::try_from(s.as_str()),
            None => ProviderId::all()
                .iter()
                .copied()
                .find(|id| id.capability() == capability)
                .ok_or_else(|| anyhow!("No {capability} provider available.")),
        }
    }

    /// Store default provider for its capability.
    pub fn set_default_provider(&mut self, id: ProviderId) {
        let slot = match id.capability() {
            Capability::Weather => &mut self.default_weather_provider,
            Capability::Geocode => &mut self.default_geocode_provider,
        };
        *slot = Some(id.as_str().to_string());
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    pub fn provider_base_url(&self, id: ProviderId) -> &str {
        self.provider_config(id)
            .and_then(|cfg| cfg.base_url.as_deref())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| id.default_base_url())
    }

    /// Convenience helper: set/replace a provider's base URL.
    pub fn upsert_provider_base_url(&mut self, id: ProviderId, base_url: String) {
        self.providers
            .entry(id.as_str().to_string())
            .or_default()
            .base_url = Some(base_url);
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .filter(|ua| !ua.is_empty())
            .unwrap_or(http::DEFAULT_USER_AGENT)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(http::DEFAULT_TIMEOUT)
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "wxgate", "wxgate")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
