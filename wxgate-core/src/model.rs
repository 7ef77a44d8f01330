use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const ABSOLUTE_ZERO_C: f64 = -273.15;

/// Weather at one point in time, normalized to SI units.
///
/// Observations and forecast periods both map to this shape. Fields the
/// upstream did not report stay at zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Forecast {
    pub source_provider: String,
    pub forecast_time: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    /// Celsius.
    pub temperature: f64,
    /// Celsius.
    pub feels_like: f64,
    /// Percent.
    pub humidity: f64,
    /// hPa.
    pub pressure: f64,
    /// m/s.
    pub wind_speed: f64,
    /// Degrees clockwise from north, `[0, 360)`.
    pub wind_direction: f64,
    /// Kilometres.
    pub visibility: f64,
    /// Percent.
    pub cloud_cover: f64,
    /// Millimetres.
    pub precipitation: f64,
    pub weather_code: String,
    pub description: String,
    pub uv_index: f64,
}

impl Forecast {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_provider.is_empty() {
            return Err(ValidationError::new("source_provider", "is required"));
        }
        if self.temperature < ABSOLUTE_ZERO_C {
            return Err(ValidationError::new("temperature", "cannot be below absolute zero"));
        }
        if !(0.0..=100.0).contains(&self.humidity) {
            return Err(ValidationError::new("humidity", "must be between 0 and 100"));
        }
        if self.pressure < 0.0 {
            return Err(ValidationError::new("pressure", "cannot be negative"));
        }
        if self.wind_speed < 0.0 {
            return Err(ValidationError::new("wind_speed", "cannot be negative"));
        }
        if !(0.0..360.0).contains(&self.wind_direction) {
            return Err(ValidationError::new("wind_direction", "must be between 0 and 359 degrees"));
        }
        if !(0.0..=100.0).contains(&self.cloud_cover) {
            return Err(ValidationError::new("cloud_cover", "must be between 0 and 100"));
        }
        if self.precipitation < 0.0 {
            return Err(ValidationError::new("precipitation", "cannot be negative"));
        }
        if self.uv_index < 0.0 {
            return Err(ValidationError::new("uv_index", "cannot be negative"));
        }
        Ok(())
    }
}

/// An active warning or advisory for a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Lower-cased provider vocabulary, e.g. "severe".
    pub severity: String,
    pub urgency: String,
    pub category: String,
    /// `None` when the upstream value was missing or unparsable.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub areas: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

/// A geocoded location.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Place {
    pub display_name: String,
    pub address_line1: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    /// ISO 3166-1 alpha-2.
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub place_type: String,
    /// How well this match corresponds to the query, `[0, 1]`.
    pub confidence: f64,
    pub source: String,
    pub source_place_id: String,
    pub bounding_box: Option<BoundingBox>,
}

impl Place {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.display_name.is_empty() {
            return Err(ValidationError::new("display_name", "is required"));
        }
        if self.display_name.chars().count() > 500 {
            return Err(ValidationError::new("display_name", "must be 500 characters or less"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::new("latitude", "must be between -90 and 90"));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::new("longitude", "must be between -180 and 180"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::new("confidence", "must be between 0 and 1"));
        }
        if !self.country_code.is_empty() && self.country_code.chars().count() != 2 {
            return Err(ValidationError::new(
                "country_code",
                "must be 2 characters (ISO 3166-1 alpha-2)",
            ));
        }
        if self.source.is_empty() {
            return Err(ValidationError::new("source", "is required"));
        }
        Ok(())
    }
}

/// Envelope stored in the cache around any provider payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse<T> {
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    pub data: T,
    /// Set by the reader when the envelope came out of the cache.
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl<T> ProviderResponse<T> {
    pub fn fresh(provider: impl Into<String>, data: T) -> Self {
        Self {
            provider: provider.into(),
            timestamp: Utc::now(),
            data,
            cached: false,
            ttl_secs: None,
        }
    }
}
