//! Parses and formats the byte sizes and durations used in the config and in log messages.
use std::time::Duration;

/// Renders a number of bytes using the largest binary unit which keeps the value above 1.
///
/// # Examples
/// ```
/// # use peercache::fmt::format_size;
/// assert_eq!(format_size(0), "0 bytes");
/// assert_eq!(format_size(1), "1 byte");
/// assert_eq!(format_size(2048), "2.00 KiB");
/// assert_eq!(format_size(87_340), "85.3 KiB");
/// assert_eq!(format_size(64 * 1024 * 1024), "64.0 MiB");
/// assert_eq!(format_size(873_400_000_000), "813 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    if size_in_bytes == 1 {
        return "1 byte".to_owned();
    } else if size_in_bytes < 1024 {
        return format!("{} bytes", size_in_bytes);
    }

    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

    let mut unit = 0;
    let mut size = size_in_bytes as f64 / 1024.;
    while size >= 1024. && unit < UNITS.len() - 1 {
        size /= 1024.;
        unit += 1;
    }

    if size < 10. {
        format!("{:.2} {}", size, UNITS[unit])
    } else if size < 100. {
        format!("{:.1} {}", size, UNITS[unit])
    } else {
        format!("{:.0} {}", size, UNITS[unit])
    }
}

/// Parses a byte size like "64m" or "2 K".
///
/// A plain number is treated as bytes. The optional suffix (**b**, **k**, **m**, **g** or **t**,
/// case-insensitive) selects a binary multiple.
///
/// # Examples
/// ```
/// # use peercache::fmt::parse_size;
/// assert_eq!(parse_size("2048").unwrap(), 2048);
/// assert_eq!(parse_size("100b").unwrap(), 100);
/// assert_eq!(parse_size("2k").unwrap(), 2048);
/// assert_eq!(parse_size("64 M").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(parse_size("1g").unwrap(), 1024 * 1024 * 1024);
///
/// assert_eq!(parse_size("1.5g").is_err(), true);
/// assert_eq!(parse_size("-1").is_err(), true);
/// assert_eq!(parse_size("12 parsecs").is_err(), true);
/// ```
pub fn parse_size(value: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref SIZE: regex::Regex = regex::Regex::new(r"^\s*(\d+)\s*([bBkKmMgGtT]?)\s*$").unwrap();
    }

    let value = value.as_ref();
    let captures = SIZE.captures(value).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid size: '{}'. Expected a positive number with an optional unit (b, k, m, g, t).",
            value
        )
    })?;

    let number: usize = captures[1].parse()?;
    let multiplier: usize = match captures[2].to_ascii_lowercase().as_str() {
        "k" => 1 << 10,
        "m" => 1 << 20,
        "g" => 1 << 30,
        "t" => 1 << 40,
        _ => 1,
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("Size '{}' is too large.", value))
}

/// Parses a duration like "500ms", "2s" or "1 m".
///
/// A plain number is treated as milliseconds.
///
/// # Examples
/// ```
/// # use peercache::fmt::parse_duration;
/// # use std::time::Duration;
/// assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("2 s").unwrap(), Duration::from_secs(2));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
///
/// assert_eq!(parse_duration("soon").is_err(), true);
/// ```
pub fn parse_duration(value: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref DURATION: regex::Regex =
            regex::Regex::new(r"^\s*(\d+)\s*(ms|s|m|h|MS|S|M|H)?\s*$").unwrap();
    }

    let value = value.as_ref();
    let captures = DURATION.captures(value).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid duration: '{}'. Expected a positive number with an optional unit (ms, s, m, h).",
            value
        )
    })?;

    let number: u64 = captures[1].parse()?;
    let unit = captures
        .get(2)
        .map(|unit| unit.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    let seconds_per_unit = match unit.as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => return Ok(Duration::from_millis(number)),
    };

    number
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow::anyhow!("Duration '{}' is too large.", value))
}

#[cfg(test)]
mod tests {
    use crate::fmt::{format_size, parse_duration, parse_size};

    #[test]
    fn configured_sizes_can_be_printed() {
        for (size, expected) in [
            ("2k", "2.00 KiB"),
            ("64m", "64.0 MiB"),
            ("512m", "512 MiB"),
            ("3g", "3.00 GiB"),
        ] {
            assert_eq!(format_size(parse_size(size).unwrap()), expected);
        }
    }

    #[test]
    fn overflowing_sizes_are_rejected() {
        assert_eq!(parse_size("99999999999999999999").is_err(), true);
        assert_eq!(parse_size(format!("{}t", usize::MAX)).is_err(), true);
    }

    #[test]
    fn overflowing_durations_are_rejected() {
        assert_eq!(parse_duration("9999999999999999999h").is_err(), true);
        assert_eq!(parse_duration(format!("{}m", u64::MAX / 2)).is_err(), true);
        assert_eq!(parse_duration("99999999999999999999").is_err(), true);

        // The largest values which still fit are accepted...
        assert_eq!(
            parse_duration(format!("{}h", u64::MAX / 3600)).unwrap(),
            std::time::Duration::from_secs(u64::MAX / 3600 * 3600)
        );
        assert_eq!(
            parse_duration(format!("{}", u64::MAX)).unwrap(),
            std::time::Duration::from_millis(u64::MAX)
        );
    }
}
