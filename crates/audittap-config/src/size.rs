//! Size strings with SI and IEC unit suffixes.
//!
//! | Suffix | Multiplier |
//! |--------|------------|
//! | (none), `B` | 1 |
//! | `k`, `K`, `kB`, `KB` | 10^3 |
//! | `M`, `MB` | 10^6 |
//! | `G`, `GB` | 10^9 |
//! | `T`, `TB` | 10^12 |
//! | `Ki`, `KiB` | 2^10 |
//! | `Mi`, `MiB` | 2^20 |
//! | `Gi`, `GiB` | 2^30 |
//! | `Ti`, `TiB` | 2^40 |

use crate::ConfigError;

const FIELD: &str = "size_threshold";

/// Parses a size string such as `"1MB"`, `"512KiB"` or `"100"` into bytes.
///
/// Fractional values are allowed (`"1.5MB"`) and rounded to the nearest byte.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` for an empty string, a missing or
/// negative number, an unknown unit, or a value that overflows `u64`.
///
/// # Example
///
/// ```
/// use audittap_config::parse_size;
///
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// assert_eq!(parse_size("2KiB").unwrap(), 2048);
/// ```
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(FIELD, "empty size"));
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    if number.is_empty() {
        return Err(ConfigError::invalid(
            FIELD,
            format!("'{input}' does not start with a number"),
        ));
    }

    let multiplier = unit_multiplier(unit.trim()).ok_or_else(|| {
        ConfigError::invalid(FIELD, format!("unknown unit '{}'", unit.trim()))
    })?;

    if number.contains('.') {
        let value: f64 = number
            .parse()
            .map_err(|_| ConfigError::invalid(FIELD, format!("invalid number '{number}'")))?;
        let bytes = (value * multiplier as f64).round();
        if !bytes.is_finite() || bytes > u64::MAX as f64 {
            return Err(ConfigError::invalid(FIELD, format!("'{input}' is too large")));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = bytes as u64;
        return Ok(whole);
    }

    let value: u64 = number
        .parse()
        .map_err(|_| ConfigError::invalid(FIELD, format!("invalid number '{number}'")))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::invalid(FIELD, format!("'{input}' is too large")))
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    let multiplier = match unit {
        "" | "B" => 1,
        "k" | "K" | "kB" | "KB" => 1_000,
        "M" | "MB" => 1_000_000,
        "G" | "GB" => 1_000_000_000,
        "T" | "TB" => 1_000_000_000_000,
        "Ki" | "KiB" => 1 << 10,
        "Mi" | "MiB" => 1 << 20,
        "Gi" | "GiB" => 1 << 30,
        "Ti" | "TiB" => 1 << 40,
        _ => return None,
    };
    Some(multiplier)
}
