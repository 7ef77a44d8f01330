//! Named provider instances, grouped by capability.
//!
//! The registry is a plain value: build it once at startup and pass it (or an
//! `Arc` of it) to whoever needs providers. Lookups are by exact,
//! case-sensitive name and the first registration with a given name wins.

use std::sync::Arc;

use crate::provider::{GeocodeProvider, WeatherProvider};

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    weather: Vec<Arc<dyn WeatherProvider>>,
    geocode: Vec<Arc<dyn GeocodeProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_weather(&mut self, provider: Arc<dyn WeatherProvider>) {
        tracing::info!(provider = provider.name(), "registered weather provider");
        self.weather.push(provider);
    }

    pub fn register_geocode(&mut self, provider: Arc<dyn GeocodeProvider>) {
        tracing::info!(provider = provider.name(), "registered geocode provider");
        self.geocode.push(provider);
    }

    /// All weather providers in registration order.
    pub fn weather_providers(&self) -> &[Arc<dyn WeatherProvider>] {
        &self.weather
    }

    pub fn geocode_providers(&self) -> &[Arc<dyn GeocodeProvider>] {
        &self.geocode
    }

    pub fn weather_provider(&self, name: &str) -> Option<Arc<dyn WeatherProvider>> {
        self.weather.iter().find(|p| p.name() == name).cloned()
    }

    pub fn geocode_provider(&self, name: &str) -> Option<Arc<dyn GeocodeProvider>> {
        self.geocode.iter().find(|p| p.name() == name).cloned()
    }
}
