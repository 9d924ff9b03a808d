use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Deserializer};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a backend timestamp. RFC 3339 is preferred; naive date-times and
/// bare dates are read as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    parse_date(value)
        .and_then(|date| {
            date.and_hms_opt(0, 0, 0)
                .ok_or_else(|| format!("Invalid date: {}", value))
        })
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .map_err(|_| format!("Invalid timestamp format: {}", value))
}

/// Parse a `YYYY-MM-DD` date, ignoring any trailing time component.
pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    let value = value.trim();
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date format: {}", e))
}

/// Parse a `+HH:MM` / `-HH:MM` offset (or `Z`) into a fixed offset.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Ok(utc_offset());
    }

    let (sign, rest) = match value.chars().next() {
        Some('+') => (1, &value[1..]),
        Some('-') => (-1, &value[1..]),
        _ => return Err(format!("Offset must start with '+' or '-': {}", value)),
    };

    let mut parts = rest.splitn(2, ':');
    let hours: i32 = parts
        .next()
        .unwrap_or_default()
        .parse()
        .map_err(|_| format!("Invalid offset hours: {}", value))?;
    let minutes: i32 = match parts.next() {
        Some(m) => m
            .parse()
            .map_err(|_| format!("Invalid offset minutes: {}", value))?,
        None => 0,
    };

    if hours > 14 || minutes > 59 {
        return Err(format!("Offset out of range: {}", value));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("Offset out of range: {}", value))
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) if !value.trim().is_empty() => parse_date(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_timestamp("2023-07-06T14:35:22+03:00").unwrap();
        assert_eq!(ts.hour(), 11);
    }

    #[test]
    fn parses_naive_formats_as_utc() {
        let a = parse_timestamp("2023-07-06 14:35:22").unwrap();
        let b = parse_timestamp("2023-07-06T14:35:22.120").unwrap();
        assert_eq!(a.hour(), 14);
        assert_eq!(b.minute(), 35);
    }

    #[test]
    fn parses_bare_date_as_midnight() {
        let ts = parse_timestamp("2023-11-10").unwrap();
        assert_eq!(ts.day(), 10);
        assert_eq!(ts.hour(), 0);
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_utc_offset("+03:00").unwrap().local_minus_utc(), 3 * 3600);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("03:00").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
    }
}
