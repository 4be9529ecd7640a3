//! Human readable sizes as used by manifests and the command line
//!
//! Units are binary (`K` = 1024) and uppercase only.

use crate::error::AllfilesError;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Parse a size such as `512`, `1.5K`, `20M` or `3G` into bytes.
///
/// Fractional byte counts are truncated.
///
/// # Errors
///
/// Returns [`AllfilesError::InvalidSize`] when the numeric part is not a
/// finite, non-negative number. Callers treat this as fatal.
pub fn parse_size(text: &str) -> Result<u64, AllfilesError> {
    let (number, multiplier) = if let Some(n) = text.strip_suffix('K') {
        (n, KIB)
    } else if let Some(n) = text.strip_suffix('M') {
        (n, MIB)
    } else if let Some(n) = text.strip_suffix('G') {
        (n, GIB)
    } else {
        (text, 1)
    };

    let value: f64 = number
        .parse()
        .map_err(|_| AllfilesError::InvalidSize(text.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(AllfilesError::InvalidSize(text.to_string()));
    }

    Ok((value * multiplier as f64) as u64)
}

/// Format a byte count with the largest unit it exceeds, two decimals.
pub fn format_size(bytes: u64) -> String {
    if bytes > GIB {
        format!("{:.2}G", bytes as f64 / GIB as f64)
    } else if bytes > MIB {
        format!("{:.2}M", bytes as f64 / MIB as f64)
    } else if bytes > KIB {
        format!("{:.2}K", bytes as f64 / KIB as f64)
    } else {
        bytes.to_string()
    }
}
