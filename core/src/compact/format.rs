//! Human-readable sizes and durations for compaction alerts.

use super::NEVER_COMPACTED_HOURS;

/// `"812 B"`, `"512 KB"` (whole KiB), or `"1.5 MB"`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{} KB", bytes / KB)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// `"1h 30m"`, `"45m"`, or `"never"` for the never-compacted sentinel.
pub fn format_elapsed(hours: f64) -> String {
    if hours >= NEVER_COMPACTED_HOURS {
        return "never".to_string();
    }
    let minutes = (hours.max(0.0) * 60.0).round() as u64;
    let (h, m) = (minutes / 60, minutes % 60);
    if h > 0 {
        format!("{}h {}m", h, m)
    } else {
        format!("{}m", m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(524_288), "512 KB");
        assert_eq!(format_bytes(1_048_575), "1023 KB");
        assert_eq!(format_bytes(1_048_576), "1.0 MB");
        assert_eq!(format_bytes(1_572_864), "1.5 MB");
    }

    #[test]
    fn elapsed() {
        assert_eq!(format_elapsed(1.5), "1h 30m");
        assert_eq!(format_elapsed(0.75), "45m");
        assert_eq!(format_elapsed(0.0), "0m");
        assert_eq!(format_elapsed(5.0), "5h 0m");
        assert_eq!(format_elapsed(-1.0), "0m");
    }

    #[test]
    fn sentinel_is_never() {
        assert_eq!(format_elapsed(NEVER_COMPACTED_HOURS), "never");
    }
}
