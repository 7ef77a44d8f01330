use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ProviderError, Stage},
    model::Place,
    provider::{
        GeocodeProvider, ProviderSettings,
        http::{build_client, decode, fetch_json},
    },
};

pub const PROVIDER_NAME: &str = "Census";
pub const DEFAULT_BASE_URL: &str = "https://geocoding.geo.census.gov/geocoder";

const BENCHMARK: &str = "2020";
const VINTAGE: &str = "Current_Current";

/// Reverse lookups are trusted more than fuzzy address matches.
pub const REVERSE_CONFIDENCE: f64 = 0.9;
const EMPTY_QUERY_CONFIDENCE: f64 = 0.5;
const MIN_CONFIDENCE: f64 = 0.1;
const MAX_FUZZY_CONFIDENCE: f64 = 0.95;

/// US Census Bureau geocoder.
#[derive(Debug, Clone)]
pub struct CensusProvider {
    base_url: String,
    http: Client,
}

impl CensusProvider {
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

    async fn address_matches(
        &self,
        cancel: &CancellationToken,
        endpoint: &str,
        query: &[(&str, &str)],
        stage: Stage,
    ) -> Result<Vec<Value>, ProviderError> {
        let url = format!("{}/locations/{endpoint}", self.base_url);
        let body = fetch_json(&self.http, &url, query, stage, cancel).await?;
        let response: GeocodeResponse = decode(body, stage)?;
        Ok(response.result.address_matches)
    }
}

#[async_trait]
impl GeocodeProvider for CensusProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supported_regions(&self) -> &[&'static str] {
        &["US"]
    }

    async fn geocode(
        &self,
        cancel: &CancellationToken,
        address: &str,
    ) -> Result<Vec<Place>, ProviderError> {
        let query = [
            ("address", address),
            ("format", "json"),
            ("benchmark", BENCHMARK),
            ("vintage", VINTAGE),
        ];
        let matches = self
            .address_matches(cancel, "onelineaddress", &query, Stage::Geocode)
            .await?;

        let places: Vec<Place> = matches
            .into_iter()
            .filter_map(|raw| match decode::<AddressMatch>(raw, Stage::Geocode) {
                Ok(m) => {
                    let confidence = match_confidence(address, &m.matched_address);
                    let (lat, lon) = (m.coordinates.y, m.coordinates.x);
                    Some(m.into_place(lat, lon, confidence))
                }
                Err(e) => {
                    tracing::debug!(provider = PROVIDER_NAME, error = %e, "skipping address match");
                    None
                }
            })
            .collect();

        if places.is_empty() {
            return Err(ProviderError::NoResults { query: address.to_string() });
        }

        Ok(places)
    }

    async fn reverse_geocode(
        &self,
        cancel: &CancellationToken,
        lat: f64,
        lon: f64,
    ) -> Result<Place, ProviderError> {
        let x = format!("{lon:.6}");
        let y = format!("{lat:.6}");
        let query = [
            ("x", x.as_str()),
            ("y", y.as_str()),
            ("format", "json"),
            ("benchmark", BENCHMARK),
            ("vintage", VINTAGE),
        ];
        let matches = self
            .address_matches(cancel, "reversegeocoding", &query, Stage::ReverseGeocode)
            .await?;

        // Only the best match is used.
        let first = matches
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NoResults { query: format!("{lat:.6}, {lon:.6}") })?;
        let m: AddressMatch = decode(first, Stage::ReverseGeocode)?;

        Ok(m.into_place(lat, lon, REVERSE_CONFIDENCE))
    }
}

/// Street line assembled from address components in a fixed order:
/// house number range, pre-direction, pre-type, street name, suffix type,
/// suffix direction, pre-qualifier, suffix qualifier.
pub fn build_address_line(c: &AddressComponents) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !c.from_address.is_empty() {
        if !c.to_address.is_empty() && c.to_address != c.from_address {
            parts.push(format!("{}-{}", c.from_address, c.to_address));
        } else {
            parts.push(c.from_address.clone());
        }
    }

    let rest = [
        &c.pre_direction,
        &c.pre_type,
        &c.street_name,
        &c.suffix_type,
        &c.suffix_direction,
        &c.pre_qualifier,
        &c.suffix_qualifier,
    ];
    parts.extend(rest.into_iter().filter(|s| !s.is_empty()).cloned());

    parts.join(" ")
}

/// Share of the query's words that appear in the matched address.
pub fn match_confidence(original: &str, matched: &str) -> f64 {
    let original = original.trim().to_lowercase();
    let matched = matched.trim().to_lowercase();

    if original.is_empty() {
        return EMPTY_QUERY_CONFIDENCE;
    }
    if original == matched {
        return 1.0;
    }

    let original_words: Vec<&str> = original.split_whitespace().collect();
    let matched_words: Vec<&str> = matched.split_whitespace().collect();

    let common = original_words
        .iter()
        .filter(|w| matched_words.contains(*w))
        .count();

    let similarity = common as f64 / original_words.len() as f64;
    similarity.clamp(MIN_CONFIDENCE, MAX_FUZZY_CONFIDENCE)
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    result: GeocodeResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeocodeResult {
    #[serde(default)]
    address_matches: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressMatch {
    matched_address: String,
    coordinates: Coordinates,
    #[serde(default)]
    tiger_line: TigerLine,
    #[serde(default)]
    address_components: AddressComponents,
}

impl AddressMatch {
    fn into_place(self, lat: f64, lon: f64, confidence: f64) -> Place {
        let address_line1 = build_address_line(&self.address_components);
        let c = self.address_components;

        Place {
            display_name: self.matched_address,
            address_line1,
            city: c.city,
            region: c.state,
            postal_code: c.zip,
            country: "United States".to_string(),
            country_code: "US".to_string(),
            latitude: lat,
            longitude: lon,
            place_type: "address".to_string(),
            confidence,
            source: PROVIDER_NAME.to_string(),
            source_place_id: self.tiger_line.tiger_line_id,
            bounding_box: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Coordinates {
    x: f64,
    y: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TigerLine {
    #[serde(default)]
    tiger_line_id: String,
}

/// Structured address fields as the Census geocoder returns them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressComponents {
    pub zip: String,
    pub street_name: String,
    pub pre_type: String,
    pub city: String,
    pub pre_direction: String,
    pub suffix_direction: String,
    pub from_address: String,
    pub state: String,
    pub suffix_type: String,
    pub to_address: String,
    pub suffix_qualifier: String,
    pub pre_qualifier: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_line_with_range_and_suffix() {
        let c = AddressComponents {
            from_address: "100".into(),
            to_address: "199".into(),
            street_name: "Oak".into(),
            suffix_type: "Ave".into(),
            ..Default::default()
        };
        assert_eq!(build_address_line(&c), "100-199 Oak Ave");
    }

    #[test]
    fn address_line_street_only() {
        let c = AddressComponents { street_name: "Broadway".into(), ..Default::default() };
        assert_eq!(build_address_line(&c), "Broadway");
    }

    #[test]
    fn address_line_single_number_when_range_collapses() {
        let c = AddressComponents {
            from_address: "4600".into(),
            to_address: "4600".into(),
            pre_direction: "N".into(),
            street_name: "Silver Hill".into(),
            suffix_type: "Rd".into(),
            ..Default::default()
        };
        assert_eq!(build_address_line(&c), "4600 N Silver Hill Rd");
    }

    #[test]
    fn address_line_full_component_order() {
        let c = AddressComponents {
            from_address: "1".into(),
            to_address: "99".into(),
            pre_direction: "N".into(),
            pre_type: "Old".into(),
            street_name: "Main".into(),
            suffix_type: "St".into(),
            suffix_direction: "SW".into(),
            pre_qualifier: "Alt".into(),
            suffix_qualifier: "Ext".into(),
            ..Default::default()
        };
        assert_eq!(build_address_line(&c), "1-99 N Old Main St SW Alt Ext");
    }

    #[test]
    fn address_line_empty_components() {
        assert_eq!(build_address_line(&AddressComponents::default()), "");
    }

    #[test]
    fn confidence_exact_match_is_one() {
        assert_eq!(match_confidence("  123 Main St ", "123 MAIN ST"), 1.0);
    }

    #[test]
    fn confidence_disjoint_is_clamped_low() {
        let c = match_confidence("foo bar", "baz qux");
        assert!((0.1..=0.5).contains(&c));
        assert_eq!(c, 0.1);
    }

    #[test]
    fn confidence_empty_original_is_default() {
        assert_eq!(match_confidence("", "123 MAIN ST"), 0.5);
        assert_eq!(match_confidence("   ", ""), 0.5);
    }

    #[test]
    fn confidence_partial_overlap() {
        // 2 of 4 words match
        let c = match_confidence("123 main st springfield", "123 MAIN AVE, BOSTON");
        assert_eq!(c, 0.5);
    }

    #[test]
    fn confidence_full_overlap_is_capped() {
        let c = match_confidence("123 main st", "123 MAIN ST SPRINGFIELD IL");
        assert_eq!(c, 0.95);
    }

    #[test]
    fn reverse_confidence_is_fixed() {
        let m: AddressMatch = serde_json::from_value(serde_json::json!({
            "matchedAddress": "1 X ST",
            "coordinates": { "x": -77.0, "y": 38.0 }
        }))
        .unwrap();
        let place = m.into_place(38.5, -77.5, REVERSE_CONFIDENCE);
        assert_eq!(place.confidence, 0.9);
        assert_eq!(place.latitude, 38.5);
        assert_eq!(place.longitude, -77.5);
    }
}
