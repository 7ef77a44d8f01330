//! Core library for `wxgate`.
//!
//! This crate defines:
//! - Canonical weather and place records, and the unit conversions that
//!   produce them
//! - Adapters for the upstream weather (NWS) and geocoding (US Census) APIs
//! - A registry of providers by capability
//! - A namespaced cache-aside layer over a key-value store
//! - Configuration handling
//!
//! It is used by `wxgate-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod provider;
pub mod registry;
pub mod service;

pub use cache::{KvStore, MemoryStore, RedisStore, RequestCache, TtlPolicy};
pub use config::{CacheConfig, Config, ProviderConfig};
pub use error::{CacheError, ErrorKind, ProviderError, Stage, ValidationError};
pub use model::{BoundingBox, Forecast, Place, ProviderResponse, WeatherAlert};
pub use provider::{Capability, GeocodeProvider, ProviderId, WeatherProvider};
pub use registry::ProviderRegistry;
pub use service::{ServiceError, WeatherService};

pub use tokio_util::sync::CancellationToken;
