use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use rust_decimal::Decimal;

/// Decimal places of the account currency.
pub const CURRENCY_PRECISION: u32 = 2;

/// Layout used for persisted invoice timestamps (always UTC).
const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Naive ISO-8601 layouts the upstream has been seen to emit without an offset.
const UPSTREAM_NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Round to currency precision and pin the scale, so `100`, `100.0` and
/// `100.004` all become `100.00`.
pub fn normalize_amount(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(CURRENCY_PRECISION);
    rounded.rescale(CURRENCY_PRECISION);
    rounded
}

/// Convert an upstream minor-unit amount (kopecks) to currency units.
pub fn amount_from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, CURRENCY_PRECISION)
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .with_context(|| format!("Invalid timestamp '{}', expected DD.MM.YYYY HH:MM:SS", value))?;
    Ok(naive.and_utc())
}

/// Current time at the resolution the registry persists.
pub fn now_seconds() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Parse an operation time from the upstream. Offsets are honored; values
/// without one are taken as UTC.
pub fn parse_upstream_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    UPSTREAM_NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Serde adapter for timestamps stored as `DD.MM.YYYY HH:MM:SS`.
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(at))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount(dec!(100)).to_string(), "100.00");
        assert_eq!(normalize_amount(dec!(100.1)).to_string(), "100.10");
        assert_eq!(normalize_amount(dec!(99.999)).to_string(), "100.00");
        assert_eq!(normalize_amount(dec!(0.004)).to_string(), "0.00");
    }

    #[test]
    fn test_amount_from_minor_units() {
        assert_eq!(amount_from_minor_units(10000), dec!(100.00));
        assert_eq!(amount_from_minor_units(10001), dec!(100.01));
        assert_eq!(amount_from_minor_units(5), dec!(0.05));
    }

    #[test]
    fn test_timestamp_format_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let text = format_timestamp(&at);
        assert_eq!(text, "07.03.2024 09:05:01");
        assert_eq!(parse_timestamp(&text).unwrap(), at);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("2024-03-07").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_parse_upstream_time() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(parse_upstream_time("2024-03-07T09:05:01Z"), Some(expected));
        assert_eq!(parse_upstream_time("2024-03-07T12:05:01+03:00"), Some(expected));
        assert_eq!(parse_upstream_time("2024-03-07T09:05:01"), Some(expected));
        let fractional = parse_upstream_time("2024-03-07T09:05:01.250");
        assert_eq!(fractional.map(|t| t.trunc_subsecs(0)), Some(expected));
        assert_eq!(parse_upstream_time("yesterday"), None);
    }
}
