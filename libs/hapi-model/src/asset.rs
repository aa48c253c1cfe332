//! Sensors bound to RTU pins

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named sensor bound to one RTU pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: i64,
    pub rtuid: String,
    pub abbreviation: String,
    pub name: String,
    /// Key of the value in the RTU's telemetry reply
    pub pin: String,
    pub unit: String,
}

/// One reading of an asset, as stored and as published on `ASSET/RESPONSE/<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReading {
    pub asset_id: i64,
    pub timestamp: DateTime<Utc>,
    /// `None` when the asset has never reported
    pub value: Option<f64>,
    pub unit: String,
}

impl AssetReading {
    /// Parse an inbound response payload
    ///
    /// Accepts the JSON form, or a bare number which is stamped with `now`.
    /// The reading always belongs to `asset`, whatever id the payload names.
    pub fn parse(asset: &Asset, payload: &str, now: DateTime<Utc>) -> Result<Self, String> {
        let trimmed = payload.trim();
        if let Ok(mut reading) = serde_json::from_str::<AssetReading>(trimmed) {
            reading.asset_id = asset.asset_id;
            return Ok(reading);
        }
        trimmed
            .parse::<f64>()
            .map(|value| AssetReading {
                asset_id: asset.asset_id,
                timestamp: now,
                value: Some(value),
                unit: asset.unit.clone(),
            })
            .map_err(|_| format!("Unrecognized asset payload: '{}'", trimmed))
    }
}

/// Extract a numeric value from a telemetry field
///
/// Devices report numbers either as JSON numbers or as strings, sometimes
/// with a trailing `%`.
pub fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn asset() -> Asset {
        Asset {
            asset_id: 4,
            rtuid: "RTU1".into(),
            abbreviation: "wt".into(),
            name: "Water Temp".into(),
            pin: "A0".into(),
            unit: "C".into(),
        }
    }

    #[test]
    fn test_parse_bare_number() {
        let now = Utc::now();
        let reading = AssetReading::parse(&asset(), " 21.5 ", now).unwrap();
        assert_eq!(reading.value, Some(21.5));
        assert_eq!(reading.timestamp, now);
        assert_eq!(reading.unit, "C");
    }

    #[test]
    fn test_parse_json_keeps_asset_id_of_topic() {
        let payload = json!({
            "asset_id": 9,
            "timestamp": "2026-03-01T10:00:00Z",
            "value": 18.0,
            "unit": "C",
        });
        let reading = AssetReading::parse(&asset(), &payload.to_string(), Utc::now()).unwrap();
        assert_eq!(reading.asset_id, 4);
        assert_eq!(reading.value, Some(18.0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AssetReading::parse(&asset(), "warm", Utc::now()).is_err());
    }

    #[test]
    fn test_numeric_value_forms() {
        assert_eq!(numeric_value(&json!(3)), Some(3.0));
        assert_eq!(numeric_value(&json!("45%")), Some(45.0));
        assert_eq!(numeric_value(&json!(" 7.25 ")), Some(7.25));
        assert_eq!(numeric_value(&json!(null)), None);
        assert_eq!(numeric_value(&json!("n/a")), None);
    }
}
