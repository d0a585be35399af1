use std::time::Duration;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse a whole number of `unit_secs`-sized units (e.g. 60 for minutes) into a [`Duration`]. Negative, empty or
/// malformed values yield `None` so that the caller can decide on (and log) a fallback.
pub fn parse_duration_units(value: Option<String>, unit_secs: u64) -> Option<Duration> {
    let units = value?.trim().parse::<u64>().ok()?;
    units.checked_mul(unit_secs).map(Duration::from_secs)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some(" off ".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration_units(Some("15".into()), 60), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration_units(Some("-1".into()), 60), None);
        assert_eq!(parse_duration_units(Some("abc".into()), 1), None);
        assert_eq!(parse_duration_units(None, 1), None);
    }
}
