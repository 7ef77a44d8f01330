use crate::{
    Config, Forecast, Place, ProviderRegistry, WeatherAlert,
    error::ProviderError,
    provider::{census::CensusProvider, nws::NwsProvider},
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

pub mod census;
pub mod http;
pub mod nws;

/// What a provider can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Weather,
    Geocode,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Capability::Weather => "weather",
            Capability::Geocode => "geocode",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Nws,
    Census,
}

impl ProviderId {
    /// Short config/CLI key.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Nws => "nws",
            ProviderId::Census => "census",
        }
    }

    /// Name the provider reports and registers under.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Nws => nws::PROVIDER_NAME,
            ProviderId::Census => census::PROVIDER_NAME,
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            ProviderId::Nws => Capability::Weather,
            ProviderId::Census => Capability::Geocode,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::Nws => nws::DEFAULT_BASE_URL,
            ProviderId::Census => census::DEFAULT_BASE_URL,
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::Nws, ProviderId::Census]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "nws" => Ok(ProviderId::Nws),
            "census" => Ok(ProviderId::Census),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: nws, census."
            )),
        }
    }
}

/// A source of current conditions, forecasts and alerts.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn supported_regions(&self) -> &[&'static str];

    async fn current_weather(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
    ) -> Result<Forecast, ProviderError>;

    /// Up to `days` worth of forecast periods.
    async fn forecast(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
        days: u32,
    ) -> Result<Vec<Forecast>, ProviderError>;

    async fn alerts(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<WeatherAlert>, ProviderError>;
}

/// A source of forward and reverse geocoding.
#[async_trait]
pub trait GeocodeProvider: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn supported_regions(&self) -> &[&'static str];

    /// Candidates in upstream rank order. Never empty on success.
    async fn geocode(
        &self,
        cancel: &CancellationToken,
        address: &str,
    ) -> Result<Vec<Place>, ProviderError>;

    async fn reverse_geocode(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
    ) -> Result<Place, ProviderError>;
}

/// Connection settings shared by every adapter.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn for_provider(id: ProviderId, config: &Config) -> Self {
        Self {
            base_url: config.provider_base_url(id).to_string(),
            user_agent: config.user_agent().to_string(),
            timeout: config.timeout(),
        }
    }
}

/// Build a registry holding every known provider, configured from `config`.
pub fn registry_from_config(config: &Config) -> anyhow::Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    for id in ProviderId::all() {
        let settings = ProviderSettings::for_provider(*id, config);
        match id {
            ProviderId::Nws => {
                let provider = NwsProvider::from_settings(&settings)
                    .map_err(|e| anyhow::anyhow!("Failed to set up provider '{id}': {e}"))?;
                registry.register_weather(Arc::new(provider));
            }
            ProviderId::Census => {
                let provider = CensusProvider::from_settings(&settings)
                    .map_err(|e| anyhow::anyhow!("Failed to set up provider '{id}': {e}"))?;
                registry.register_geocode(Arc::new(provider));
            }
        }
    }

    Ok(registry)
}

/// Resolve the configured (or explicitly named) weather provider.
pub fn weather_provider_for(
    registry: &ProviderRegistry,
    config: &Config,
    requested: Option<&str>,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let id = resolve_id(config, requested, Capability::Weather)?;
    registry.weather_provider(id.display_name()).ok_or_else(|| {
        anyhow::anyhow!("Provider '{id}' is not registered as a weather provider.")
    })
}

/// Resolve the configured (or explicitly named) geocode provider.
pub fn geocode_provider_for(
    registry: &ProviderRegistry,
    config: &Config,
    requested: Option<&str>,
) -> anyhow::Result<Arc<dyn GeocodeProvider>> {
    let id = resolve_id(config, requested, Capability::Geocode)?;
    registry.geocode_provider(id.display_name()).ok_or_else(|| {
        anyhow::anyhow!("Provider '{id}' is not registered as a geocode provider.")
    })
}

fn resolve_id(
    config: &Config,
    requested: Option<&str>,
    capability: Capability,
) -> anyhow::Result<ProviderId> {
    let id = match requested {
        Some(name) => ProviderId::try_from(name)?,
        None => config.default_provider_id(capability)?,
    };

    if id.capability() != capability {
        return Err(anyhow::anyhow!(
            "Provider '{id}' does not offer {capability} data (it is a {} provider).",
            id.capability()
        ));
    }

    Ok(id)
}
