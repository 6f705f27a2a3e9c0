//! Built-in parsers for integers, calendar types, durations and JSON shapes

use crate::{error::ParseError, registry::TypeRegistry};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::{Map, Value};
use std::{sync::LazyLock, time::Duration};

pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub const SHORT_TIME_FORMAT: &str = "%H:%M";

const SECOND: u64 = 1_000_000;

// 10m30s
static UNIT_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)([a-zA-Z]+)").expect("valid duration pattern"));

/// Register the built-in parsers, most specific calendar type first
pub(crate) fn register_builtins(registry: &mut TypeRegistry) {
    registry
        .register(parse_datetime)
        .register(parse_time)
        .register(parse_date)
        .register(parse_duration)
        .register(parse_list)
        .register(parse_mapping)
        .register(parse_integer);
}

fn temporal(kind: &'static str, input: &str, source: chrono::ParseError) -> ParseError {
    ParseError::InvalidTemporal {
        kind,
        input: input.to_string(),
        source,
    }
}

/// Parse `YYYY-MM-DDTHH:MM:SS`, no timezone
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .map_err(|source| temporal("date-time", value, source))
}

/// Parse `HH:MM:SS` with optional fraction, or `HH:MM`
pub fn parse_time(value: &str) -> Result<NaiveTime, ParseError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|err| NaiveTime::parse_from_str(value, SHORT_TIME_FORMAT).map_err(|_| err))
        .map_err(|source| temporal("time", value, source))
}

/// Parse `YYYY-MM-DD`
pub fn parse_date(value: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|source| temporal("date", value, source))
}

fn unit_micros(unit: &str) -> Option<u64> {
    let micros = match unit.to_ascii_lowercase().as_str() {
        "us" => 1,
        "ms" => 1_000,
        "s" => SECOND,
        "m" => 60 * SECOND,
        "h" => 60 * 60 * SECOND,
        "d" => 24 * 60 * 60 * SECOND,
        _ => return None,
    };
    Some(micros)
}

/// Parse a duration written as `<amount><unit>` pairs, e.g. `10m30s` or `300ms`
///
/// Units are `us`, `ms`, `s`, `m`, `h` and `d`, in any case. Pairs add up,
/// repeated units included, and text between pairs is ignored. A string
/// without any pair is a zero duration.
pub fn parse_duration(value: &str) -> Result<Duration, ParseError> {
    let overflow = || ParseError::DurationOverflow {
        input: value.to_string(),
    };

    let mut total: u64 = 0;
    for caps in UNIT_PAIR.captures_iter(value) {
        let (_, [amount, unit]) = caps.extract();
        let multiplier = unit_micros(unit).ok_or_else(|| ParseError::UnknownUnit {
            unit: unit.to_string(),
            input: value.to_string(),
        })?;
        total = amount
            .parse::<u64>()
            .ok()
            .and_then(|amount| amount.checked_mul(multiplier))
            .and_then(|micros| total.checked_add(micros))
            .ok_or_else(overflow)?;
    }
    Ok(Duration::from_micros(total))
}

/// Parse an integer, detecting the base from a `0x`, `0o` or `0b` prefix
///
/// An optional sign and `_` separators between digits are accepted.
pub fn parse_integer(value: &str) -> Result<i128, ParseError> {
    let invalid = || ParseError::InvalidInteger {
        input: value.to_string(),
    };

    let trimmed = value.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (radix, digits) = match unsigned.get(..2) {
        Some("0x" | "0X") => (16, &unsigned[2..]),
        Some("0o" | "0O") => (8, &unsigned[2..]),
        Some("0b" | "0B") => (2, &unsigned[2..]),
        _ => (10, unsigned),
    };
    // 0x_ff is allowed, like Python and Rust literals
    let digits = if radix == 10 {
        digits
    } else {
        digits.strip_prefix('_').unwrap_or(digits)
    };

    let well_formed = !digits.is_empty()
        && !digits.starts_with('_')
        && !digits.ends_with('_')
        && !digits.contains("__")
        && digits.chars().all(|c| c == '_' || c.is_digit(radix));
    if !well_formed {
        return Err(invalid());
    }

    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = u128::from_str_radix(&cleaned, radix).map_err(|_| invalid())?;
    if negative {
        0i128.checked_sub_unsigned(magnitude).ok_or_else(invalid)
    } else {
        i128::try_from(magnitude).map_err(|_| invalid())
    }
}

fn parse_json(value: &str) -> Result<Value, ParseError> {
    serde_json::from_str(value).map_err(|source| ParseError::Json {
        input: value.to_string(),
        source,
    })
}

/// Parse a JSON array
pub fn parse_list(value: &str) -> Result<Vec<Value>, ParseError> {
    match parse_json(value)? {
        Value::Array(items) => Ok(items),
        _ => Err(ParseError::NotAList {
            input: value.to_string(),
        }),
    }
}

/// Parse a JSON object
pub fn parse_mapping(value: &str) -> Result<Map<String, Value>, ParseError> {
    match parse_json(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotAMapping {
            input: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duration_seconds() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_micros(10_000_000));
    }

    #[test]
    fn test_duration_milliseconds() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_micros(300_000));
    }

    #[test]
    fn test_duration_compound() {
        assert_eq!(parse_duration("10m30s").unwrap(), Duration::from_secs(630));
        assert_eq!(parse_duration("1d2h").unwrap(), Duration::from_secs(93_600));
        assert_eq!(parse_duration("7us").unwrap(), Duration::from_micros(7));
    }

    #[test]
    fn test_duration_repeated_units_accumulate() {
        assert_eq!(
            parse_duration("1h1h").unwrap(),
            Duration::from_micros(7_200_000_000)
        );
    }

    #[test]
    fn test_duration_case_insensitive() {
        assert_eq!(parse_duration("2H").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_duration("5Ms").unwrap(), Duration::from_millis(5));
    }

    #[test]
    fn test_duration_without_pairs_is_zero() {
        assert_eq!(parse_duration("").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("soon").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_duration_ignores_text_between_pairs() {
        assert_eq!(parse_duration("1m, 30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_duration_unknown_unit() {
        let err = parse_duration("5xx").unwrap_err();
        match err {
            ParseError::UnknownUnit { unit, input } => {
                assert_eq!(unit, "xx");
                assert_eq!(input, "5xx");
            }
            other => panic!("Expected UnknownUnit error, got {:?}", other),
        }
    }

    #[test]
    fn test_duration_overflow() {
        let err = parse_duration("99999999999999999999d").unwrap_err();
        assert!(matches!(err, ParseError::DurationOverflow { .. }));
    }

    #[test]
    fn test_integer_bases() {
        assert_eq!(parse_integer("8080").unwrap(), 8080);
        assert_eq!(parse_integer("0x10").unwrap(), 16);
        assert_eq!(parse_integer("0o10").unwrap(), 8);
        assert_eq!(parse_integer("0b10").unwrap(), 2);
        assert_eq!(parse_integer("0XfF").unwrap(), 255);
    }

    #[test]
    fn test_integer_sign_and_separators() {
        assert_eq!(parse_integer("-42").unwrap(), -42);
        assert_eq!(parse_integer("+7").unwrap(), 7);
        assert_eq!(parse_integer("-0x10").unwrap(), -16);
        assert_eq!(parse_integer("1_000_000").unwrap(), 1_000_000);
        assert_eq!(parse_integer("0x_ff").unwrap(), 255);
        assert_eq!(parse_integer(" 12 ").unwrap(), 12);
    }

    #[test]
    fn test_integer_rejects_other_formats() {
        for input in ["", "1.5", "abc", "0x", "0b102", "--1", "+-1", "1__0", "_1", "1_", "0z10"] {
            assert!(
                matches!(parse_integer(input), Err(ParseError::InvalidInteger { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_integer_range() {
        assert_eq!(parse_integer(&i128::MIN.to_string()).unwrap(), i128::MIN);
        assert_eq!(parse_integer(&i128::MAX.to_string()).unwrap(), i128::MAX);
        assert!(parse_integer(&u128::MAX.to_string()).is_err());
    }

    #[test]
    fn test_datetime() {
        let parsed = parse_datetime("2019-05-18T13:43:12").unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2019, 5, 18).unwrap());
        assert_eq!(parsed.time(), NaiveTime::from_hms_opt(13, 43, 12).unwrap());
    }

    #[test]
    fn test_datetime_requires_t_separator() {
        let err = parse_datetime("2019-05-18 13:43:12").unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidTemporal {
                kind: "date-time",
                ..
            }
        ));
    }

    #[test]
    fn test_date() {
        assert_eq!(
            parse_date("2019-05-18").unwrap(),
            NaiveDate::from_ymd_opt(2019, 5, 18).unwrap()
        );
        assert!(parse_date("2019-13-01").is_err());
    }

    #[test]
    fn test_time_forms() {
        assert_eq!(
            parse_time("13:43:12").unwrap(),
            NaiveTime::from_hms_opt(13, 43, 12).unwrap()
        );
        assert_eq!(
            parse_time("13:43").unwrap(),
            NaiveTime::from_hms_opt(13, 43, 0).unwrap()
        );
        assert_eq!(
            parse_time("13:43:12.250").unwrap(),
            NaiveTime::from_hms_milli_opt(13, 43, 12, 250).unwrap()
        );
        assert!(matches!(
            parse_time("noon"),
            Err(ParseError::InvalidTemporal { kind: "time", .. })
        ));
    }

    #[test]
    fn test_list() {
        assert_eq!(parse_list("[1, 2, 3]").unwrap(), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_list_wrong_shape() {
        assert!(matches!(parse_list("{\"x\": 1}"), Err(ParseError::NotAList { .. })));
        assert!(matches!(parse_list("[1, 2"), Err(ParseError::Json { .. })));
    }

    #[test]
    fn test_mapping() {
        let map = parse_mapping("{\"x\":1,\"y\":2}").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["x"], json!(1));
        assert_eq!(map["y"], json!(2));
    }

    #[test]
    fn test_mapping_wrong_shape() {
        assert!(matches!(parse_mapping("[1]"), Err(ParseError::NotAMapping { .. })));
        assert!(matches!(parse_mapping("x=1"), Err(ParseError::Json { .. })));
    }
}
