//! Parsing and unit conversion for Kubernetes-style resource quantities
//! (`Ki/Mi/Gi/Ti` binary, `K/M/G/T` decimal, and bare CPU core counts or
//! millicores). The external object store only understands plain integers,
//! so quota values are projected down to decimal units when synced there --
//! deliberately lossy, see the design notes on quota unit conversion.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuotaError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid quantity: {0}")]
    Invalid(String),
}

const KI: u64 = 1024;
const MI: u64 = KI * 1024;
const GI: u64 = MI * 1024;
const TI: u64 = GI * 1024;
const DECIMAL_K: u64 = 1_000;
const DECIMAL_M: u64 = DECIMAL_K * 1_000;
const DECIMAL_G: u64 = DECIMAL_M * 1_000;
const DECIMAL_T: u64 = DECIMAL_G * 1_000;

/// Parses a memory/storage quantity (e.g. `"64Gi"`, `"100Gi"`, `"20GB"`, `"512"`) to bytes.
pub fn parse_quantity_to_bytes(s: &str) -> Result<u64, QuotaError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(QuotaError::Empty);
    }
    let (numeric, unit) = split_numeric_suffix(s);
    let value: f64 = numeric
        .parse()
        .map_err(|_| QuotaError::Invalid(s.to_string()))?;
    if value < 0.0 {
        return Err(QuotaError::Invalid(s.to_string()));
    }
    let multiplier = match unit {
        "" => 1,
        "Ki" => KI,
        "Mi" => MI,
        "Gi" => GI,
        "Ti" => TI,
        "K" | "KB" => DECIMAL_K,
        "M" | "MB" => DECIMAL_M,
        "G" | "GB" => DECIMAL_G,
        "T" | "TB" => DECIMAL_T,
        _ => return Err(QuotaError::Invalid(s.to_string())),
    };
    Ok((value * multiplier as f64).round() as u64)
}

/// Parses a CPU quantity: a bare number of cores (`"2"`, `"0.5"`) or millicores (`"500m"`).
pub fn parse_cpu_cores(s: &str) -> Result<f64, QuotaError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(QuotaError::Empty);
    }
    if let Some(milli) = s.strip_suffix('m') {
        let value: f64 = milli
            .parse()
            .map_err(|_| QuotaError::Invalid(s.to_string()))?;
        return Ok(value / 1000.0);
    }
    s.parse().map_err(|_| QuotaError::Invalid(s.to_string()))
}

fn split_numeric_suffix(s: &str) -> (&str, &str) {
    let split_at = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    s.split_at(split_at)
}

/// Converts a byte count to an integer count of decimal gigabytes, the unit
/// the external object store expects.
pub fn bytes_to_decimal_gb(bytes: u64) -> u64 {
    bytes / DECIMAL_G
}

/// Projects a memory/storage quantity straight to decimal GB for external sync.
pub fn quantity_to_decimal_gb(s: &str) -> Result<u64, QuotaError> {
    Ok(bytes_to_decimal_gb(parse_quantity_to_bytes(s)?))
}

/// Spoke-side storage ingress normalization: values under 1Ti are floored up
/// to 1Ti to satisfy downstream validation. Hub-side values are left as-is.
pub fn normalize_spoke_storage(s: &str) -> Result<String, QuotaError> {
    let bytes = parse_quantity_to_bytes(s)?;
    if bytes < TI {
        return Ok("1Ti".to_string());
    }
    let ti = (bytes as f64 / TI as f64).ceil() as u64;
    Ok(format!("{}Ti", ti.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_and_decimal_suffixes() {
        assert_eq!(parse_quantity_to_bytes("1Ki").unwrap(), 1024);
        assert_eq!(parse_quantity_to_bytes("1Mi").unwrap(), 1024 * 1024);
        assert_eq!(parse_quantity_to_bytes("1Gi").unwrap(), GI);
        assert_eq!(parse_quantity_to_bytes("1Ti").unwrap(), TI);
        assert_eq!(parse_quantity_to_bytes("1G").unwrap(), DECIMAL_G);
        assert_eq!(parse_quantity_to_bytes("512").unwrap(), 512);
    }

    #[test]
    fn rejects_empty_and_garbage_input() {
        assert_eq!(parse_quantity_to_bytes(""), Err(QuotaError::Empty));
        assert!(parse_quantity_to_bytes("not-a-quantity").is_err());
        assert!(parse_quantity_to_bytes("-5Gi").is_err());
    }

    #[test]
    fn cpu_parses_bare_cores_and_millicores() {
        assert_eq!(parse_cpu_cores("2").unwrap(), 2.0);
        assert_eq!(parse_cpu_cores("500m").unwrap(), 0.5);
    }

    #[test]
    fn gigabyte_projection_round_trips_within_one_unit() {
        for input in ["1", "20", "64Gi", "100Gi", "1Ti", "20GB"] {
            let bytes = parse_quantity_to_bytes(input).unwrap();
            let gb = bytes_to_decimal_gb(bytes);
            let reconstructed = gb * DECIMAL_G;
            let diff = bytes.abs_diff(reconstructed);
            assert!(diff <= DECIMAL_G, "{input} drifted by {diff} bytes");
        }
    }

    #[test]
    fn spoke_storage_floors_small_values_to_one_terabyte() {
        assert_eq!(normalize_spoke_storage("100Gi").unwrap(), "1Ti");
        assert_eq!(normalize_spoke_storage("1Ti").unwrap(), "1Ti");
        assert_eq!(normalize_spoke_storage("2Ti").unwrap(), "2Ti");
    }
}
