//! Cache-aside read path over the provider registry.
//!
//! Reads check the cache first, fill it from the provider on a miss and
//! write the result back with a TTL that matches how quickly the data goes
//! stale. Concurrent fills of the same key are collapsed with a
//! set-if-absent lock. A misbehaving cache never fails a read: the provider
//! is called directly instead.

use std::{future::Future, sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;

use crate::{
    cache::{RequestCache, TtlPolicy},
    error::{CacheError, ProviderError},
    model::{Forecast, Place, ProviderResponse, WeatherAlert},
    provider::{Capability, GeocodeProvider, WeatherProvider},
    registry::ProviderRegistry,
};

const FILL_LOCK_TTL: Duration = Duration::from_secs(30);
const FILL_WAIT_INTERVAL: Duration = Duration::from_millis(100);
const FILL_WAIT_ATTEMPTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no {capability} provider named '{name}'")]
    UnknownProvider { capability: Capability, name: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone)]
pub struct WeatherService {
    registry: Arc<ProviderRegistry>,
    cache: RequestCache,
    ttl: TtlPolicy,
}

impl WeatherService {
    pub fn new(registry: Arc<ProviderRegistry>, cache: RequestCache, ttl: TtlPolicy) -> Self {
        Self { registry, cache, ttl }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn current_weather(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        lat: f64,
        lon: f64,
    ) -> Result<ProviderResponse<Forecast>, ServiceError> {
        let p = self.weather(provider)?;
        let key = format!("current:{}:{}", p.name(), point_key(lat, lon));
        self.read_through(cancel, &key, p.name(), self.ttl.current, || {
            p.current_weather(cancel, lat, lon)
        })
        .await
    }

    pub async fn forecast(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        lat: f64,
        lon: f64,
        days: u32,
    ) -> Result<ProviderResponse<Vec<Forecast>>, ServiceError> {
        let p = self.weather(provider)?;
        let key = format!("forecast:{}:{}:{days}", p.name(), point_key(lat, lon));
        self.read_through(cancel, &key, p.name(), self.ttl.forecast, || {
            p.forecast(cancel, lat, lon, days)
        })
        .await
    }

    pub async fn alerts(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        lat: f64,
        lon: f64,
    ) -> Result<ProviderResponse<Vec<WeatherAlert>>, ServiceError> {
        let p = self.weather(provider)?;
        let key = format!("alerts:{}:{}", p.name(), point_key(lat, lon));
        self.read_through(cancel, &key, p.name(), self.ttl.alerts, || p.alerts(cancel, lat, lon))
            .await
    }

    pub async fn geocode(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        address: &str,
    ) -> Result<ProviderResponse<Vec<Place>>, ServiceError> {
        let p = self.geocoder(provider)?;
        let key = geocode_key(p.name(), address);
        self.read_through(cancel, &key, p.name(), self.ttl.location, || p.geocode(cancel, address))
            .await
    }

    pub async fn reverse_geocode(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        lat: f64,
        lon: f64,
    ) -> Result<ProviderResponse<Place>, ServiceError> {
        let p = self.geocoder(provider)?;
        let key = format!("reverse:{}:{lat:.6},{lon:.6}", p.name());
        self.read_through(cancel, &key, p.name(), self.ttl.location, || {
            p.reverse_geocode(cancel, lat, lon)
        })
        .await
    }

    /// Drop a cached forward-geocoding result. Location data is long-lived,
    /// so it is only refreshed on request.
    pub async fn invalidate_geocode(
        &self,
        cancel: &CancellationToken,
        provider: &str,
        address: &str,
    ) -> Result<(), ServiceError> {
        let p = self.geocoder(provider)?;
        self.cache.delete(cancel, &geocode_key(p.name(), address)).await?;
        Ok(())
    }

    fn weather(&self, name: &str) -> Result<Arc<dyn WeatherProvider>, ServiceError> {
        self.registry.weather_provider(name).ok_or_else(|| ServiceError::UnknownProvider {
            capability: Capability::Weather,
            name: name.to_string(),
        })
    }

    fn geocoder(&self, name: &str) -> Result<Arc<dyn GeocodeProvider>, ServiceError> {
        self.registry.geocode_provider(name).ok_or_else(|| ServiceError::UnknownProvider {
            capability: Capability::Geocode,
            name: name.to_string(),
        })
    }

    async fn read_through<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        key: &str,
        provider: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<ProviderResponse<T>, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        match self.cached::<T>(cancel, key).await {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%key, error = %e, "cache read failed, calling provider directly");
                return direct(provider, fetch).await;
            }
        }

        let lock_key = format!("lock:{key}");
        match self.cache.set_nx(cancel, &lock_key, b"1", FILL_LOCK_TTL).await {
            Ok(true) => {
                let result = fetch().await;
                if let Ok(data) = &result {
                    self.store(cancel, key, provider, data, ttl).await;
                }
                // released even when the caller gave up mid-fetch
                let release = CancellationToken::new();
                if let Err(e) = self.cache.delete(&release, &lock_key).await {
                    tracing::warn!(key = %lock_key, error = %e, "failed to release fill lock");
                }

                let mut response = ProviderResponse::fresh(provider, result?);
                response.ttl_secs = Some(ttl.as_secs());
                Ok(response)
            }
            Ok(false) => {
                tracing::debug!(%key, "fill in progress elsewhere, waiting");
                for _ in 0..FILL_WAIT_ATTEMPTS {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(FILL_WAIT_INTERVAL) => {}
                    }
                    if let Ok(Some(hit)) = self.cached::<T>(cancel, key).await {
                        return Ok(hit);
                    }
                }
                direct(provider, fetch).await
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "cache lock failed, calling provider directly");
                direct(provider, fetch).await
            }
        }
    }

    async fn cached<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Option<ProviderResponse<T>>, CacheError> {
        let Some(bytes) = self.cache.get(cancel, key).await? else {
            tracing::debug!(%key, "cache miss");
            return Ok(None);
        };

        let mut response: ProviderResponse<T> = serde_json::from_slice(&bytes)?;
        response.cached = true;
        tracing::debug!(%key, "cache hit");
        Ok(Some(response))
    }

    async fn store<T: Serialize>(
        &self,
        cancel: &CancellationToken,
        key: &str,
        provider: &str,
        data: &T,
        ttl: Duration,
    ) {
        let mut envelope = ProviderResponse::fresh(provider, data);
        envelope.ttl_secs = Some(ttl.as_secs());

        let written = match serde_json::to_vec(&envelope) {
            Ok(bytes) => self.cache.set(cancel, key, &bytes, ttl).await,
            Err(e) => Err(CacheError::from(e)),
        };
        if let Err(e) = written {
            tracing::warn!(%key, error = %e, "failed to write cache entry");
        }
    }
}

async fn direct<T, F, Fut>(provider: &str, fetch: F) -> Result<ProviderResponse<T>, ServiceError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    Ok(ProviderResponse::fresh(provider, fetch().await?))
}

fn point_key(lat: f64, lon: f64) -> String {
    format!("{lat:.4},{lon:.4}")
}

fn geocode_key(provider: &str, address: &str) -> String {
    let normalized = address.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    format!("geocode:{provider}:{normalized}")
}
