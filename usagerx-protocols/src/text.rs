//! ## usagerx-protocols::text
//! Key/value body used by text-format usage packets.
//!
//! The body follows the sender prelude and reads
//! `HOSTNAME=<host> KEY=VALUE KEY="VALUE WITH SPACES" `. Tokens are separated
//! by ASCII whitespace; a value opening with `"` runs to the next `"`.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

use crate::error::{DecodeError, EncodeError};

/// Ordered key/value pairs parsed from a text body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextFields {
    pairs: Vec<(String, String)>,
}

impl TextFields {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(body).map_err(|_| DecodeError::InvalidUtf8 { field: "body" })?;
        let mut pairs = Vec::new();
        let mut chars = text.char_indices().peekable();

        loop {
            while chars.next_if(|(_, c)| c.is_ascii_whitespace()).is_some() {}
            let Some(&(start, _)) = chars.peek() else {
                break;
            };

            // key runs to '=', which must come before any whitespace
            let mut key_end = None;
            while let Some((i, c)) = chars.next() {
                if c == '=' {
                    key_end = Some(i);
                    break;
                }
                if c.is_ascii_whitespace() {
                    return Err(DecodeError::MalformedToken(text[start..i].to_string()));
                }
            }
            let Some(key_end) = key_end else {
                return Err(DecodeError::MalformedToken(text[start..].to_string()));
            };
            if key_end == start {
                return Err(DecodeError::MalformedToken(token_at(text, start)));
            }
            let key = &text[start..key_end];

            let value = match chars.peek() {
                Some(&(quote, '"')) => {
                    chars.next();
                    let mut close = None;
                    for (i, c) in chars.by_ref() {
                        if c == '"' {
                            close = Some(i);
                            break;
                        }
                    }
                    match close {
                        Some(close) => &text[quote + 1..close],
                        None => return Err(DecodeError::MalformedToken(text[start..].to_string())),
                    }
                }
                Some(&(value_start, _)) => {
                    let mut value_end = text.len();
                    while let Some((i, c)) = chars.next() {
                        if c.is_ascii_whitespace() {
                            value_end = i;
                            break;
                        }
                    }
                    &text[value_start..value_end]
                }
                None => "",
            };

            pairs.push((key.to_string(), value.to_string()));
        }

        Ok(Self { pairs })
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, key: &'static str) -> Result<&str, DecodeError> {
        self.get(key).ok_or(DecodeError::MissingField(key))
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_owned)
    }

    pub fn get_i64(&self, key: &'static str) -> Result<Option<i64>, DecodeError> {
        self.get(key)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| DecodeError::out_of_range(key, format!("'{v}' is not an integer")))
            })
            .transpose()
    }

    pub fn require_i64(&self, key: &'static str) -> Result<i64, DecodeError> {
        self.get_i64(key)?.ok_or(DecodeError::MissingField(key))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn token_at(text: &str, start: usize) -> String {
    text[start..]
        .split(|c: char| c.is_ascii_whitespace())
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Parses a GridFTP `YYYYMMDDHHMMSS.<usec>` timestamp (UTC).
///
/// The part after the dot is a plain microsecond count, not a decimal
/// fraction: the server prints `tv_usec` with `%d`, so `.5000` is 5000 us.
pub fn parse_compact_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, DecodeError> {
    let invalid = |reason: String| DecodeError::out_of_range(field, format!("'{value}': {reason}"));

    let (seconds, micros) = match value.split_once('.') {
        Some((seconds, micros)) => (seconds, Some(micros)),
        None => (value, None),
    };
    let naive = NaiveDateTime::parse_from_str(seconds, "%Y%m%d%H%M%S").map_err(|e| invalid(e.to_string()))?;

    let micros = match micros {
        Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => digits
            .parse::<u32>()
            .ok()
            .filter(|us| *us <= 999_999)
            .ok_or_else(|| invalid("microseconds out of range".into()))?,
        Some(_) => return Err(invalid("microseconds are not a number".into())),
        None => 0,
    };

    naive
        .with_nanosecond(micros * 1_000)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| invalid("microseconds out of range".into()))
}

/// Parses fractional seconds since the epoch, e.g. `1254400000.250000`.
pub fn parse_epoch_seconds(field: &'static str, value: &str) -> Result<DateTime<Utc>, DecodeError> {
    let invalid = || DecodeError::out_of_range(field, format!("'{value}' is not an epoch time"));
    let seconds: f64 = value.parse().map_err(|_| invalid())?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(invalid());
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos).ok_or_else(invalid)
}

/// Appends `KEY=VALUE ` to `out`, quoting values that contain a space.
pub fn write_pair(out: &mut String, key: &str, value: &str) -> Result<(), EncodeError> {
    if key.is_empty() || key.contains(|c: char| c == '=' || c == '"' || c.is_ascii_whitespace()) {
        return Err(EncodeError::InvalidKey(key.to_string()));
    }
    if value.contains('"') || value.contains(|c: char| c.is_ascii_whitespace() && c != ' ') {
        return Err(EncodeError::InvalidValue(key.to_string()));
    }

    out.push_str(key);
    out.push('=');
    if value.contains(' ') {
        out.push('"');
        out.push_str(value);
        out.push('"');
    } else {
        out.push_str(value);
    }
    out.push(' ');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_sender_body() {
        let body = br#"HOSTNAME=gftp.example.org START=20090101120000.500000 VER="0.17 (gcc64dbg, 1222134484-78)" NBYTES=504 "#;
        let fields = TextFields::parse(body).unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields.get("HOSTNAME"), Some("gftp.example.org"));
        assert_eq!(fields.get("VER"), Some("0.17 (gcc64dbg, 1222134484-78)"));
        assert_eq!(fields.require_i64("NBYTES").unwrap(), 504);
    }

    #[test]
    fn accepts_empty_values_and_body() {
        assert!(TextFields::parse(b"").unwrap().is_empty());
        let fields = TextFields::parse(b"A= B=2").unwrap();
        assert_eq!(fields.get("A"), Some(""));
        assert_eq!(fields.get("B"), Some("2"));
    }

    #[test]
    fn rejects_token_without_equals() {
        assert_eq!(
            TextFields::parse(b"HOSTNAME=x garbage K=v"),
            Err(DecodeError::MalformedToken("garbage".into()))
        );
    }

    #[test]
    fn rejects_unterminated_quote() {
        assert!(matches!(
            TextFields::parse(br#"VER="0.17 (gcc"#),
            Err(DecodeError::MalformedToken(_))
        ));
    }

    #[test]
    fn rejects_non_integer() {
        let fields = TextFields::parse(b"NBYTES=lots").unwrap();
        assert!(matches!(
            fields.get_i64("NBYTES"),
            Err(DecodeError::OutOfRange { field: "NBYTES", .. })
        ));
    }

    #[test]
    fn parses_compact_timestamp() {
        let ts = parse_compact_timestamp("START", "20090214093015.250000").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2009, 2, 14));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (9, 30, 15));
        assert_eq!(ts.timestamp_subsec_micros(), 250_000);
        assert!(parse_compact_timestamp("START", "yesterday").is_err());
    }

    #[test]
    fn compact_timestamp_fraction_is_a_microsecond_count() {
        let micros = |value| {
            parse_compact_timestamp("START", value)
                .unwrap()
                .timestamp_subsec_micros()
        };
        assert_eq!(micros("20090101120000.0"), 0);
        assert_eq!(micros("20090101120000.5000"), 5_000);
        assert_eq!(micros("20090101120000.999999"), 999_999);
        assert_eq!(micros("20090101120000.000042"), 42);
        assert_eq!(micros("20090101120000"), 0);

        let ts = parse_compact_timestamp("END", "20090101120000.5000").unwrap();
        assert_eq!(ts.second(), 0);
    }

    #[test]
    fn compact_timestamp_rejects_bad_fraction() {
        for value in [
            "20090101120000.1000000",
            "20090101120000.",
            "20090101120000.-5",
            "20090101120000.12ab",
        ] {
            assert!(
                matches!(
                    parse_compact_timestamp("START", value),
                    Err(DecodeError::OutOfRange { field: "START", .. })
                ),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn parses_fractional_epoch() {
        let ts = parse_epoch_seconds("A", "1254400000.5").unwrap();
        assert_eq!(ts.timestamp(), 1_254_400_000);
        assert_eq!(ts.timestamp_subsec_millis(), 500);
        assert!(parse_epoch_seconds("A", "-1").is_err());
    }

    #[test]
    fn write_pair_quotes_spaces() {
        let mut out = String::new();
        write_pair(&mut out, "VER", "1.2 beta").unwrap();
        write_pair(&mut out, "CODE", "226").unwrap();
        assert_eq!(out, "VER=\"1.2 beta\" CODE=226 ");

        let fields = TextFields::parse(out.as_bytes()).unwrap();
        assert_eq!(fields.get("VER"), Some("1.2 beta"));
        assert!(write_pair(&mut out, "BAD KEY", "x").is_err());
        assert!(write_pair(&mut out, "K", "say \"hi\"").is_err());
    }
}
