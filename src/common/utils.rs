//! Key and duration helpers

use crate::common::{Error, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::time::Duration;

/// Bytes escaped when a key becomes the last segment of a volume path
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'/')
    .add(b'?')
    .add(b'\\');

const MAX_KEY_LEN: usize = 1024;

pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, PATH_SEGMENT).to_string()
}

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidConfig("empty duration".into()));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::InvalidConfig(format!("missing unit: {}", s)))?;
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let (scale, from): (u64, fn(u64) -> Duration) = match unit {
        "ms" => (1, Duration::from_millis),
        "s" => (1, Duration::from_secs),
        "m" => (60, Duration::from_secs),
        "h" => (3600, Duration::from_secs),
        _ => {
            return Err(Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };
    num.checked_mul(scale)
        .map(from)
        .ok_or_else(|| Error::InvalidConfig(format!("duration out of range: {}", s)))
}

/// Validate key (must be non-empty, reasonable length)
pub fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidConfig("key cannot be empty".into()));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(Error::InvalidConfig(format!(
            "key too long (max {} bytes)",
            MAX_KEY_LEN
        )));
    }

    if key.iter().any(|b| b.is_ascii_control()) {
        return Err(Error::InvalidConfig(
            "key contains invalid characters".into(),
        ));
    }

    Ok(())
}
