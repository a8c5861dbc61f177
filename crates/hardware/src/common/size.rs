//! Memory-size and frequency quantities.
//!
//! Hierarchy descriptions written by hand use simulator-style strings such as `"16kB"`,
//! `"16KiB"`, `"512MB"`, or `"2GHz"`. Sizes are always binary multiples (`kB` and `KiB` both
//! mean 1024 bytes); frequencies are decimal.

use serde::{Deserialize, Deserializer, Serializer};

use super::error::ConfigError;

/// One kibibyte.
pub const KIB: u64 = 1024;
/// One mebibyte.
pub const MIB: u64 = 1024 * KIB;
/// One gibibyte.
pub const GIB: u64 = 1024 * MIB;

/// Splits `"16kB"` into `("16", "kB")`.
fn split_quantity(input: &str) -> (&str, &str) {
    let trimmed = input.trim();
    let idx = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(idx);
    (number, unit.trim())
}

/// Parses a memory size into bytes.
///
/// Accepts a bare integer (bytes) or an integer followed by one of `B`, `k`/`kB`/`KiB`,
/// `M`/`MB`/`MiB`, `G`/`GB`/`GiB`, `T`/`TB`/`TiB` (case-insensitive).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidQuantity`] for empty, fractional, overflowing, or unknown units.
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidQuantity {
        input: input.to_string(),
        kind: "size",
    };
    let (number, unit) = split_quantity(input);
    let value: u64 = number.parse().map_err(|_| invalid())?;
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => KIB,
        "m" | "mb" | "mib" => MIB,
        "g" | "gb" | "gib" => GIB,
        "t" | "tb" | "tib" => GIB * 1024,
        _ => return Err(invalid()),
    };
    value.checked_mul(multiplier).ok_or_else(invalid)
}

/// Parses a clock frequency into hertz (`"1GHz"`, `"500MHz"`, `"1.5GHz"`).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidQuantity`] when the text is not a positive frequency.
pub fn parse_frequency(input: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidQuantity {
        input: input.to_string(),
        kind: "frequency",
    };
    let (number, unit) = split_quantity(input);
    let value: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "hz" => 1.0,
        "khz" => 1e3,
        "mhz" => 1e6,
        "ghz" => 1e9,
        _ => return Err(invalid()),
    };
    let hz = (value * multiplier).round();
    if !hz.is_finite() || hz <= 0.0 || hz > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(hz as u64)
}

/// Formats a byte count with the largest exact binary unit (`16384` → `"16KiB"`).
pub fn format_size(bytes: u64) -> String {
    match bytes {
        0 => "0B".to_string(),
        b if b % GIB == 0 => format!("{}GiB", b / GIB),
        b if b % MIB == 0 => format!("{}MiB", b / MIB),
        b if b % KIB == 0 => format!("{}KiB", b / KIB),
        b => format!("{b}B"),
    }
}

/// Formats a frequency in hertz with the largest exact decimal unit.
pub fn format_frequency(hz: u64) -> String {
    match hz {
        h if h >= 1_000_000_000 && h % 1_000_000_000 == 0 => format!("{}GHz", h / 1_000_000_000),
        h if h >= 1_000_000 && h % 1_000_000 == 0 => format!("{}MHz", h / 1_000_000),
        h if h >= 1_000 && h % 1_000 == 0 => format!("{}kHz", h / 1_000),
        h => format!("{h}Hz"),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Number(u64),
    Text(String),
}

/// Serde adapter for byte sizes: deserializes an integer or a size string, serializes bytes.
pub mod serde_size {
    use super::{Deserialize, Deserializer, RawQuantity, Serializer, parse_size};

    /// Deserializes `16384` or `"16KiB"` into bytes.
    ///
    /// # Errors
    ///
    /// Propagates a deserializer error for unparsable strings.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match RawQuantity::deserialize(deserializer)? {
            RawQuantity::Number(n) => Ok(n),
            RawQuantity::Text(t) => parse_size(&t).map_err(serde::de::Error::custom),
        }
    }

    /// Serializes bytes as an integer.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }
}

/// Serde adapter for frequencies: deserializes hertz or a frequency string, serializes hertz.
pub mod serde_frequency {
    use super::{Deserialize, Deserializer, RawQuantity, Serializer, parse_frequency};

    /// Deserializes `1000000000` or `"1GHz"` into hertz.
    ///
    /// # Errors
    ///
    /// Propagates a deserializer error for unparsable strings.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match RawQuantity::deserialize(deserializer)? {
            RawQuantity::Number(n) => Ok(n),
            RawQuantity::Text(t) => parse_frequency(&t).map_err(serde::de::Error::custom),
        }
    }

    /// Serializes hertz as an integer.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }
}
