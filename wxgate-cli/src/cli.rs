use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use inquire::{Confirm, Text};
use wxgate_core::{
    CancellationToken, Capability, Config, Forecast, Place, ProviderId, ProviderResponse,
    RequestCache, TtlPolicy, WeatherAlert, WeatherService,
    cache::open_store,
    provider::{geocode_provider_for, registry_from_config, weather_provider_for},
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "wxgate", version, about = "Weather and geocoding lookups")]
pub struct Cli {
    /// Read and write configuration at this path instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Provider short name, overriding the configured default (e.g. "nws").
    #[arg(long, global = true)]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct Point {
    /// Latitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure endpoint and defaults for a specific provider.
    Configure {
        /// Provider short name, e.g. "nws" or "census".
        provider: String,
    },

    /// List registered providers.
    Providers,

    /// Show current conditions at a point.
    Current {
        #[command(flatten)]
        point: Point,
    },

    /// Show the forecast for a point.
    Forecast {
        #[command(flatten)]
        point: Point,

        /// Number of days (each day has a day and a night period).
        #[arg(long, default_value_t = 3)]
        days: u32,
    },

    /// Show active alerts for a point.
    Alerts {
        #[command(flatten)]
        point: Point,
    },

    /// Look up an address.
    Geocode {
        /// Free-text address, e.g. "4600 Silver Hill Rd, Washington, DC 20233".
        address: String,
    },

    /// Find the address nearest to a point.
    Reverse {
        #[command(flatten)]
        point: Point,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        match &self.command {
            Command::Configure { provider } => {
                let id = ProviderId::try_from(provider.as_str())?;
                configure(&mut config, id)?;
                match &self.config {
                    Some(path) => config.save_to(path)?,
                    None => config.save()?,
                }
                println!("Saved configuration for {id}.");
                return Ok(());
            }
            Command::Providers => {
                let registry = registry_from_config(&config)?;
                for p in registry.weather_providers() {
                    println!("{:<8} weather  regions: {}", p.name(), p.supported_regions().join(", "));
                }
                for p in registry.geocode_providers() {
                    println!("{:<8} geocode  regions: {}", p.name(), p.supported_regions().join(", "));
                }
                return Ok(());
            }
            _ => {}
        }

        let store = open_store(&config.cache)
            .await
            .context("Failed to open cache store")?;
        let cache = RequestCache::new(store, config.cache.prefix.clone());

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        lookup(&self.command, &config, self.provider.as_deref(), cache, &cancel).await
    }
}

/// Run a lookup command through the cache, closing the cache whatever the outcome.
async fn lookup(
    command: &Command,
    config: &Config,
    requested: Option<&str>,
    cache: RequestCache,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let result = async {
        let registry = Arc::new(registry_from_config(config)?);
        let service = WeatherService::new(
            registry.clone(),
            cache.clone(),
            TtlPolicy::from(&config.cache),
        );

        match command {
            Command::Current { point } => {
                let p = weather_provider_for(&registry, config, requested)?;
                let resp = service.current_weather(cancel, p.name(), point.lat, point.lon).await?;
                print_current(&resp);
            }
            Command::Forecast { point, days } => {
                let p = weather_provider_for(&registry, config, requested)?;
                let resp = service.forecast(cancel, p.name(), point.lat, point.lon, *days).await?;
                print_forecast(&resp);
            }
            Command::Alerts { point } => {
                let p = weather_provider_for(&registry, config, requested)?;
                let resp = service.alerts(cancel, p.name(), point.lat, point.lon).await?;
                print_alerts(&resp);
            }
            Command::Geocode { address } => {
                let p = geocode_provider_for(&registry, config, requested)?;
                let resp = service.geocode(cancel, p.name(), address).await?;
                print_places(&resp.provider, resp.cached, &resp.data);
            }
            Command::Reverse { point } => {
                let p = geocode_provider_for(&registry, config, requested)?;
                let resp = service.reverse_geocode(cancel, p.name(), point.lat, point.lon).await?;
                print_places(&resp.provider, resp.cached, std::slice::from_ref(&resp.data));
            }
            Command::Configure { .. } | Command::Providers => {}
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(e) = cache.close().await {
        tracing::warn!(error = %e, "failed to close cache store");
    }

    result
}

fn configure(config: &mut Config, id: ProviderId) -> anyhow::Result<()> {
    let base_url = Text::new(&format!("Base URL for {id}:"))
        .with_default(config.provider_base_url(id))
        .prompt()?;
    config.upsert_provider_base_url(id, base_url.trim().to_string());

    if id == ProviderId::Nws {
        // api.weather.gov rejects anonymous clients
        let ua = Text::new("User-Agent (include contact info):")
            .with_default(config.user_agent())
            .prompt()?;
        config.user_agent = Some(ua.trim().to_string());
    }

    let capability = id.capability();
    let make_default = Confirm::new(&format!("Use {id} as the default {capability} provider?"))
        .with_default(config.default_provider_id(capability).ok() == Some(id))
        .prompt()?;
    if make_default {
        config.set_default_provider(id);
    }

    Ok(())
}

fn local(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%a %b %e %H:%M").to_string()
}

fn source_line(provider: &str, cached: bool, fetched: &DateTime<Utc>) -> String {
    let origin = if cached { "cached" } else { "live" };
    format!("Source: {provider} ({origin}, fetched {})", local(fetched))
}

fn print_current(resp: &ProviderResponse<Forecast>) {
    let f = &resp.data;
    println!("Observed {}: {}", local(&f.valid_time), f.description);
    println!("  Temperature: {:.1} °C", f.temperature);
    if f.feels_like != 0.0 {
        println!("  Feels like:  {:.1} °C", f.feels_like);
    }
    println!("  Humidity:    {:.0} %", f.humidity);
    println!("  Wind:        {:.1} m/s from {:.0}°", f.wind_speed, f.wind_direction);
    println!("  Pressure:    {:.1} hPa", f.pressure);
    println!("  Visibility:  {:.1} km", f.visibility);
    println!("{}", source_line(&resp.provider, resp.cached, &resp.timestamp));
}

fn print_forecast(resp: &ProviderResponse<Vec<Forecast>>) {
    if resp.data.is_empty() {
        println!("No forecast periods available.");
    }
    for f in &resp.data {
        println!(
            "{}  {:>5.1} °C  wind {:>4.1} m/s from {:>5.1}°  {}",
            local(&f.valid_time),
            f.temperature,
            f.wind_speed,
            f.wind_direction,
            f.description
        );
    }
    println!("{}", source_line(&resp.provider, resp.cached, &resp.timestamp));
}

fn print_alerts(resp: &ProviderResponse<Vec<WeatherAlert>>) {
    if resp.data.is_empty() {
        println!("No active alerts.");
    }
    for a in &resp.data {
        println!("{} [{} / {} / {}]", a.title, a.severity, a.urgency, a.category);
        if let (Some(start), Some(end)) = (&a.start_time, &a.end_time) {
            println!("  {} → {}", local(start), local(end));
        }
        if !a.areas.is_empty() {
            println!("  Areas: {}", a.areas.join("; "));
        }
    }
    println!("{}", source_line(&resp.provider, resp.cached, &resp.timestamp));
}

fn print_places(provider: &str, cached: bool, places: &[Place]) {
    for p in places {
        println!("{}", p.display_name);
        println!(
            "  {:.6}, {:.6}  confidence {:.2}  ({})",
            p.latitude, p.longitude, p.confidence, p.source_place_id
        );
    }
    let origin = if cached { "cached" } else { "live" };
    println!("Source: {provider} ({origin})");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use wxgate_core::{CacheError, KvStore, MemoryStore};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "wxgate", "forecast", "--lat", "39.7456", "--lon", "-104.9994", "--days", "2",
        ])
        .unwrap();

        match cli.command {
            Command::Forecast { point, days } => {
                assert_eq!(point.lat, 39.7456);
                assert_eq!(point.lon, -104.9994);
                assert_eq!(days, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_provider_flag() {
        let cli = Cli::try_parse_from(["wxgate", "geocode", "1 Main St", "--provider", "census"])
            .unwrap();
        assert_eq!(cli.provider.as_deref(), Some("census"));
        assert!(matches!(cli.command, Command::Geocode { .. }));
    }

    #[tokio::test]
    async fn cache_is_closed_when_lookup_fails() {
        let store = Arc::new(MemoryStore::new());
        let cache = RequestCache::new(store.clone(), "test");
        let command = Command::Current { point: Point { lat: 39.7456, lon: -104.9994 } };

        // census is a geocoder, so resolution fails before any request
        let err = lookup(&command, &Config::default(), Some("census"), cache, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not offer weather data"));

        assert!(matches!(store.get("anything").await, Err(CacheError::Closed)));
    }

    #[test]
    fn capability_is_displayed_in_prompts() {
        assert_eq!(Capability::Geocode.to_string(), "geocode");
    }
}
