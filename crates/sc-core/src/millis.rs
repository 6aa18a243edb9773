//! Lenient decoding of millisecond timestamps.
//!
//! Persisted state and remote payloads are produced by clients that are loose
//! about numbers: a timestamp may arrive as an integer, a float, a numeric
//! string, `null`, or something else entirely. Anything that does not read as
//! a finite number decodes as "absent".

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Int(i64),
    Float(f64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

impl LooseNumber {
    fn into_millis(self) -> Option<i64> {
        match self {
            LooseNumber::Int(value) => Some(value),
            LooseNumber::Float(value) => value.is_finite().then_some(value as i64),
            LooseNumber::Text(text) => parse_millis(&text),
            LooseNumber::Other(_) => None,
        }
    }
}

/// Parses a numeric string the way a browser's `Number()` would for the
/// common cases: surrounding whitespace ignored, empty means zero.
pub fn parse_millis(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(0);
    }

    let parsed = trimmed.parse::<f64>().ok()?;
    parsed.is_finite().then_some(parsed as i64)
}

pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(LooseNumber::deserialize(deserializer)?.into_millis())
}

pub fn deserialize_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_opt(deserializer)?.unwrap_or(0))
}
