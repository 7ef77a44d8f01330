//! Conversions from provider-native units and vocabularies to the
//! canonical SI forms used by [`crate::model`].

const MPH_TO_MPS: f64 = 0.44704;

/// 16-point compass abbreviations, 22.5° apart starting at north.
const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn mph_to_mps(mph: f64) -> f64 {
    mph * MPH_TO_MPS
}

pub fn pascal_to_hectopascal(pa: f64) -> f64 {
    pa / 100.0
}

pub fn meters_to_kilometers(m: f64) -> f64 {
    m / 1000.0
}

/// Degrees for a compass abbreviation. Unknown or empty input maps to north.
pub fn compass_to_degrees(direction: &str) -> f64 {
    let direction = direction.trim().to_ascii_uppercase();
    COMPASS_POINTS
        .iter()
        .position(|p| *p == direction)
        .map(|i| i as f64 * 22.5)
        .unwrap_or(0.0)
}

/// Parses strings like `"5 mph"` or `"5 to 10 mph"` into m/s using the first
/// number. Returns `None` when there is no leading magnitude.
pub fn parse_wind_speed_mph(text: &str) -> Option<f64> {
    let mut parts = text.split_whitespace();
    let magnitude = parts.next()?;
    // a bare number carries no unit
    parts.next()?;
    magnitude
        .parse::<f64>()
        .ok()
        .filter(|mph| mph.is_finite() && *mph >= 0.0)
        .map(mph_to_mps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compass_points_map_to_degrees() {
        let expected = [
            ("N", 0.0),
            ("NNE", 22.5),
            ("NE", 45.0),
            ("ENE", 67.5),
            ("E", 90.0),
            ("ESE", 112.5),
            ("SE", 135.0),
            ("SSE", 157.5),
            ("S", 180.0),
            ("SSW", 202.5),
            ("SW", 225.0),
            ("WSW", 247.5),
            ("W", 270.0),
            ("WNW", 292.5),
            ("NW", 315.0),
            ("NNW", 337.5),
        ];
        for (abbr, deg) in expected {
            assert_eq!(compass_to_degrees(abbr), deg, "{abbr}");
            assert_eq!(compass_to_degrees(&abbr.to_lowercase()), deg, "{abbr} lower");
        }
    }

    #[test]
    fn unknown_compass_defaults_to_north() {
        assert_eq!(compass_to_degrees(""), 0.0);
        assert_eq!(compass_to_degrees("XYZ"), 0.0);
        assert_eq!(compass_to_degrees("north"), 0.0);
    }

    #[test]
    fn temperature_conversion() {
        assert!((fahrenheit_to_celsius(75.0) - 23.89).abs() < 0.1);
        assert!((fahrenheit_to_celsius(60.0) - 15.56).abs() < 0.1);
        assert_eq!(fahrenheit_to_celsius(32.0), 0.0);
    }

    #[test]
    fn speed_pressure_visibility() {
        assert!((mph_to_mps(10.0) - 4.4704).abs() < 0.1);
        assert_eq!(pascal_to_hectopascal(101325.0), 1013.25);
        assert_eq!(meters_to_kilometers(16000.0), 16.0);
    }

    #[test]
    fn wind_speed_text() {
        assert!((parse_wind_speed_mph("10 mph").unwrap() - 4.4704).abs() < 1e-9);
        assert!((parse_wind_speed_mph("5 to 10 mph").unwrap() - 5.0 * MPH_TO_MPS).abs() < 1e-9);
        assert_eq!(parse_wind_speed_mph(""), None);
        assert_eq!(parse_wind_speed_mph("calm winds"), None);
        assert_eq!(parse_wind_speed_mph("10"), None);
    }

    #[test]
    fn wind_speed_rejects_non_physical_magnitudes() {
        assert_eq!(parse_wind_speed_mph("inf mph"), None);
        assert_eq!(parse_wind_speed_mph("NaN mph"), None);
        assert_eq!(parse_wind_speed_mph("-5 mph"), None);
        assert_eq!(parse_wind_speed_mph("0 mph"), Some(0.0));
    }
}
