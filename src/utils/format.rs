/// Render an elapsed millisecond value as `HH:MM:SS`. Hours widen past two
/// digits rather than wrapping.
pub fn format_elapsed(elapsed_ms: u64) -> String {
    let total_secs = elapsed_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero() {
        assert_eq!(format_elapsed(0), "00:00:00");
    }

    #[test]
    fn truncates_subsecond_remainder() {
        assert_eq!(format_elapsed(999), "00:00:00");
        assert_eq!(format_elapsed(1_999), "00:00:01");
    }

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_elapsed(5_400_000), "01:30:00");
        assert_eq!(format_elapsed(3_599_000), "00:59:59");
        assert_eq!(format_elapsed(86_400_000 + 61_000), "24:01:01");
    }

    #[test]
    fn hours_widen_past_two_digits() {
        assert_eq!(format_elapsed(360_000_000), "100:00:00");
    }
}
