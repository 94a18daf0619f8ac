//! ISO-8601 duration tokens as returned by the video provider.

use std::sync::LazyLock;

use regex::Regex;

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.\d+)?S)?)?$").unwrap()
});

/// Convert a `PT#H#M#S` token to whole seconds.
///
/// Every component is optional (`PT5M`, `PT42S`, `PT1H2M3S`, `P1DT2H`).
/// Fractional seconds are truncated. Anything that does not parse yields `0`.
pub fn parse_duration_secs(token: &str) -> u64 {
    let Some(caps) = DURATION_REGEX.captures(token.trim()) else {
        return 0;
    };

    let mut total: u64 = 0;
    for (group, unit) in [(1, 86_400u64), (2, 3_600), (3, 60), (4, 1)] {
        let Some(m) = caps.get(group) else {
            continue;
        };
        let Ok(value) = m.as_str().parse::<u64>() else {
            return 0;
        };
        total = total.saturating_add(value.saturating_mul(unit));
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_token() {
        assert_eq!(parse_duration_secs("PT1H2M3S"), 3723);
    }

    #[test]
    fn minutes_only() {
        assert_eq!(parse_duration_secs("PT5M"), 300);
    }

    #[test]
    fn minutes_and_seconds() {
        assert_eq!(parse_duration_secs("PT4M13S"), 253);
    }

    #[test]
    fn single_components() {
        assert_eq!(parse_duration_secs("PT42S"), 42);
        assert_eq!(parse_duration_secs("PT2H"), 7200);
        assert_eq!(parse_duration_secs("PT1H30S"), 3630);
        assert_eq!(parse_duration_secs("P1DT1S"), 86_401);
    }

    #[test]
    fn fractional_seconds_are_truncated() {
        assert_eq!(parse_duration_secs("PT3.75S"), 3);
    }

    #[test]
    fn malformed_tokens_yield_zero() {
        for token in ["", "PT", "P", "garbage", "5M", "PT-5M", "PTxM", "PT5X", "1:02:03"] {
            assert_eq!(parse_duration_secs(token), 0, "token {token:?}");
        }
    }

    #[test]
    fn oversized_component_yields_zero() {
        assert_eq!(parse_duration_secs("PT99999999999999999999999S"), 0);
    }
}
