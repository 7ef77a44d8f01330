use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    convert::{
        compass_to_degrees, fahrenheit_to_celsius, meters_to_kilometers, parse_wind_speed_mph,
        pascal_to_hectopascal,
    },
    error::{ProviderError, Stage},
    model::{Forecast, WeatherAlert},
    provider::{
        ProviderSettings, WeatherProvider,
        http::{build_client, decode, fetch_json},
    },
};

pub const PROVIDER_NAME: &str = "NWS";
pub const DEFAULT_BASE_URL: &str = "https://api.weather.gov";

/// US National Weather Service (api.weather.gov).
#[derive(Debug, Clone)]
pub struct NwsProvider {
    base_url: String,
    http: Client,
}

impl NwsProvider {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let http = build_client(&settings.user_agent, settings.timeout)?;
        Ok(Self::new(&settings.base_url, http))
    }

    async fn grid_point(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
    ) -> Result<PointProperties, ProviderError> {
        let url = format!("{}/points/{lat:.4},{lon:.4}", self.base_url);
        let body = fetch_json(&self.http, &url, &[], Stage::GridPoint, cancel).await?;
        let point: PointResponse = decode(body, Stage::GridPoint)?;
        Ok(point.properties)
    }

    async fn first_station(
        &self,
        cancel: &CancellationToken,
        point: &PointProperties,
    ) -> Result<String, ProviderError> {
        let url = match point.observation_stations.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!(
                "{}/gridpoints/{}/{},{}/stations",
                self.base_url, point.grid_id, point.grid_x, point.grid_y
            ),
        };

        let body = fetch_json(&self.http, &url, &[], Stage::Stations, cancel).await?;
        let stations: StationsResponse = decode(body, Stage::Stations)?;

        // Only the nearest station is consulted.
        stations
            .features
            .into_iter()
            .next()
            .map(|f| f.properties.station_identifier)
            .ok_or(ProviderError::NoStations)
    }
}

#[async_trait]
impl WeatherProvider for NwsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supported_regions(&self) -> &[&'static str] {
        &["US"]
    }

    async fn current_weather(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
    ) -> Result<Forecast, ProviderError> {
        let point = self.grid_point(cancel, lat, lon).await?;
        let station = self.first_station(cancel, &point).await?;

        let url = format!("{}/stations/{station}/observations/latest", self.base_url);
        let body = fetch_json(&self.http, &url, &[], Stage::Observation, cancel).await?;
        let observation: ObservationResponse = decode(body, Stage::Observation)?;

        tracing::debug!(provider = PROVIDER_NAME, %station, "fetched latest observation");
        observation_to_forecast(observation.properties)
    }

    async fn forecast(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
        days: u32,
    ) -> Result<Vec<Forecast>, ProviderError> {
        let point = self.grid_point(cancel, lat, lon).await?;
        let forecast_url = point
            .forecast
            .filter(|url| !url.is_empty())
            .ok_or(ProviderError::MissingField { stage: Stage::GridPoint, field: "forecast" })?;

        let body = fetch_json(&self.http, &forecast_url, &[], Stage::Forecast, cancel).await?;
        let response: ForecastResponse = decode(body, Stage::Forecast)?;

        // Periods alternate day and night.
        let max_periods = (days as usize).saturating_mul(2);
        let issued = Utc::now();

        let forecasts = response
            .properties
            .periods
            .into_iter()
            .take(max_periods)
            .filter_map(|raw| match period_to_forecast(raw, issued) {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::debug!(provider = PROVIDER_NAME, error = %e, "skipping forecast period");
                    None
                }
            })
            .collect();

        Ok(forecasts)
    }

    async fn alerts(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<WeatherAlert>, ProviderError> {
        let url = format!("{}/alerts/active?point={lat:.4},{lon:.4}", self.base_url);
        let body = fetch_json(&self.http, &url, &[], Stage::Alerts, cancel).await?;
        let response: AlertsResponse = decode(body, Stage::Alerts)?;

        let alerts = response
            .features
            .into_iter()
            .filter_map(|raw| match feature_to_alert(raw) {
                Ok(a) => Some(a),
                Err(e) => {
                    tracing::debug!(provider = PROVIDER_NAME, error = %e, "skipping alert");
                    None
                }
            })
            .collect();

        Ok(alerts)
    }
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

fn observation_to_forecast(obs: ObservationProperties) -> Result<Forecast, ProviderError> {
    let timestamp = match obs.timestamp.as_deref() {
        Some(ts) if !ts.is_empty() => parse_rfc3339(ts).map_err(|source| {
            ProviderError::Timestamp { stage: Stage::Observation, value: ts.to_string(), source }
        })?,
        _ => Utc::now(),
    };

    Ok(Forecast {
        source_provider: PROVIDER_NAME.to_string(),
        forecast_time: timestamp,
        valid_time: timestamp,
        temperature: obs.temperature.or_zero(),
        feels_like: obs.wind_chill.value.or(obs.heat_index.value).unwrap_or(0.0),
        humidity: obs.relative_humidity.or_zero(),
        pressure: obs.barometric_pressure.value.map(pascal_to_hectopascal).unwrap_or(0.0),
        wind_speed: obs.wind_speed.or_zero(),
        wind_direction: obs.wind_direction.or_zero(),
        visibility: obs.visibility.value.map(meters_to_kilometers).unwrap_or(0.0),
        description: obs.text_description,
        ..Forecast::default()
    })
}

fn period_to_forecast(raw: Value, issued: DateTime<Utc>) -> Result<Forecast, ProviderError> {
    let period: ForecastPeriod = decode(raw, Stage::Forecast)?;

    let start = parse_rfc3339(&period.start_time).map_err(|source| ProviderError::Timestamp {
        stage: Stage::Forecast,
        value: period.start_time.clone(),
        source,
    })?;
    parse_rfc3339(&period.end_time).map_err(|source| ProviderError::Timestamp {
        stage: Stage::Forecast,
        value: period.end_time.clone(),
        source,
    })?;

    let temperature = if period.temperature_unit == "F" {
        fahrenheit_to_celsius(period.temperature)
    } else {
        period.temperature
    };

    let description = if period.detailed_forecast.is_empty() {
        period.short_forecast
    } else {
        period.detailed_forecast
    };

    Ok(Forecast {
        source_provider: PROVIDER_NAME.to_string(),
        forecast_time: issued,
        valid_time: start,
        temperature,
        wind_speed: parse_wind_speed_mph(&period.wind_speed).unwrap_or(0.0),
        wind_direction: compass_to_degrees(&period.wind_direction),
        description,
        ..Forecast::default()
    })
}

fn feature_to_alert(raw: Value) -> Result<WeatherAlert, ProviderError> {
    let feature: AlertFeature = decode(raw, Stage::Alerts)?;
    let p = feature.properties;

    let parse_optional = |value: Option<&str>| value.and_then(|v| parse_rfc3339(v).ok());

    Ok(WeatherAlert {
        id: p.id,
        title: p.event,
        description: p.description,
        severity: p.severity.to_lowercase(),
        urgency: p.urgency.to_lowercase(),
        category: p.category.to_lowercase(),
        start_time: parse_optional(p.onset.as_deref()),
        end_time: parse_optional(p.expires.as_deref()),
        areas: p
            .area_desc
            .split(';')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
struct PointResponse {
    properties: PointProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointProperties {
    #[serde(default)]
    grid_id: String,
    #[serde(default)]
    grid_x: i64,
    #[serde(default)]
    grid_y: i64,
    forecast: Option<String>,
    observation_stations: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StationsResponse {
    #[serde(default)]
    features: Vec<StationFeature>,
}

#[derive(Debug, Deserialize)]
struct StationFeature {
    properties: StationProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationProperties {
    station_identifier: String,
}

#[derive(Debug, Deserialize)]
struct ObservationResponse {
    properties: ObservationProperties,
}

/// A measured value; `value` is null when the station did not report it.
#[derive(Debug, Default, Deserialize)]
struct QuantitativeValue {
    value: Option<f64>,
}

impl QuantitativeValue {
    fn or_zero(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObservationProperties {
    timestamp: Option<String>,
    #[serde(default)]
    text_description: String,
    #[serde(default)]
    temperature: QuantitativeValue,
    #[serde(default)]
    wind_chill: QuantitativeValue,
    #[serde(default)]
    heat_index: QuantitativeValue,
    #[serde(default)]
    wind_direction: QuantitativeValue,
    #[serde(default)]
    wind_speed: QuantitativeValue,
    #[serde(default)]
    barometric_pressure: QuantitativeValue,
    #[serde(default)]
    relative_humidity: QuantitativeValue,
    #[serde(default)]
    visibility: QuantitativeValue,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    periods: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastPeriod {
    start_time: String,
    end_time: String,
    temperature: f64,
    #[serde(default)]
    temperature_unit: String,
    #[serde(default)]
    wind_speed: String,
    #[serde(default)]
    wind_direction: String,
    #[serde(default)]
    short_forecast: String,
    #[serde(default)]
    detailed_forecast: String,
}

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    #[serde(default)]
    features: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AlertFeature {
    properties: AlertProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertProperties {
    #[serde(default)]
    id: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    category: String,
    onset: Option<String>,
    expires: Option<String>,
    #[serde(default)]
    area_desc: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observation(props: Value) -> ObservationProperties {
        serde_json::from_value(props).unwrap()
    }

    #[test]
    fn observation_converts_units_and_keeps_missing_as_zero() {
        let obs = observation(json!({
            "timestamp": "2024-01-15T12:00:00+00:00",
            "textDescription": "Clear",
            "temperature": { "value": 20.5 },
            "relativeHumidity": { "value": 65.0 },
            "barometricPressure": { "value": 101325.0 },
            "visibility": { "value": 16000.0 },
            "windSpeed": { "value": null },
            "windDirection": { "value": 180.0 }
        }));

        let f = observation_to_forecast(obs).unwrap();
        assert_eq!(f.source_provider, "NWS");
        assert_eq!(f.temperature, 20.5);
        assert_eq!(f.humidity, 65.0);
        assert_eq!(f.pressure, 1013.25);
        assert_eq!(f.visibility, 16.0);
        assert_eq!(f.wind_speed, 0.0);
        assert_eq!(f.wind_direction, 180.0);
        assert_eq!(f.description, "Clear");
        assert_eq!(f.valid_time.to_rfc3339(), "2024-01-15T12:00:00+00:00");
    }

    #[test]
    fn observation_without_timestamp_uses_now() {
        let before = Utc::now();
        let f = observation_to_forecast(observation(json!({}))).unwrap();
        assert!(f.valid_time >= before);
        assert_eq!(f.temperature, 0.0);
    }

    #[test]
    fn observation_with_bad_timestamp_fails() {
        let err = observation_to_forecast(observation(json!({ "timestamp": "yesterday" })))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timestamp { stage: Stage::Observation, .. }));
    }

    #[test]
    fn period_converts_fahrenheit_wind_and_direction() {
        let raw = json!({
            "startTime": "2024-01-15T06:00:00-05:00",
            "endTime": "2024-01-15T18:00:00-05:00",
            "temperature": 75,
            "temperatureUnit": "F",
            "windSpeed": "10 mph",
            "windDirection": "sw",
            "shortForecast": "Sunny",
            "detailedForecast": "Sunny, with a high near 75."
        });

        let f = period_to_forecast(raw, Utc::now()).unwrap();
        assert!((f.temperature - 23.89).abs() < 0.1);
        assert!((f.wind_speed - 4.4704).abs() < 0.1);
        assert_eq!(f.wind_direction, 225.0);
        assert_eq!(f.description, "Sunny, with a high near 75.");
        assert_eq!(f.valid_time.to_rfc3339(), "2024-01-15T11:00:00+00:00");
    }

    #[test]
    fn period_in_celsius_passes_through() {
        let raw = json!({
            "startTime": "2024-01-15T06:00:00Z",
            "endTime": "2024-01-15T18:00:00Z",
            "temperature": 12,
            "temperatureUnit": "C",
            "windSpeed": "breezy",
            "windDirection": ""
        });

        let f = period_to_forecast(raw, Utc::now()).unwrap();
        assert_eq!(f.temperature, 12.0);
        assert_eq!(f.wind_speed, 0.0);
        assert_eq!(f.wind_direction, 0.0);
    }

    #[test]
    fn period_with_bad_end_time_is_rejected() {
        let raw = json!({
            "startTime": "2024-01-15T06:00:00Z",
            "endTime": "not a time",
            "temperature": 50,
            "temperatureUnit": "F"
        });
        assert!(period_to_forecast(raw, Utc::now()).is_err());
    }

    #[test]
    fn alert_lowercases_vocabulary_and_tolerates_bad_times() {
        let raw = json!({
            "properties": {
                "id": "urn:oid:2.49.0.1.840.0.1",
                "event": "Winter Storm Warning",
                "description": "Heavy snow expected.",
                "severity": "Severe",
                "urgency": "Expected",
                "category": "Met",
                "onset": "2024-01-15T06:00:00-05:00",
                "expires": "garbage",
                "areaDesc": "Boulder; Larimer;"
            }
        });

        let alert = feature_to_alert(raw).unwrap();
        assert_eq!(alert.title, "Winter Storm Warning");
        assert_eq!(alert.severity, "severe");
        assert_eq!(alert.urgency, "expected");
        assert_eq!(alert.category, "met");
        assert!(alert.start_time.is_some());
        assert!(alert.end_time.is_none());
        assert_eq!(alert.areas, vec!["Boulder".to_string(), "Larimer".to_string()]);
    }
}
