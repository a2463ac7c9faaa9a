//! Fixed-width timestamp encoding.
//!
//! Documents are ordered by comparing their serialized `dateCreated`
//! strings, so every timestamp is written as RFC 3339 with exactly six
//! fractional digits and a `Z` suffix.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Stamp {
        #[serde(with = "super")]
        at: DateTime<Utc>,
    }

    #[test]
    fn encodes_with_fixed_width() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let json = serde_json::to_string(&Stamp { at }).unwrap();
        assert_eq!(json, r#"{"at":"2024-05-01T12:00:00.000000Z"}"#);
    }

    #[test]
    fn lexical_order_matches_chronological_order() {
        let early = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1500);
        let a = serde_json::to_value(Stamp { at: early }).unwrap();
        let b = serde_json::to_value(Stamp { at: late }).unwrap();
        assert!(a["at"].as_str().unwrap() < b["at"].as_str().unwrap());
    }
}
