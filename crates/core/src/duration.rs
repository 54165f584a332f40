//! Lifetime strings of the form `<int>[smhd]` (e.g. `"30m"`, `"2h"`, `"7d"`).
//!
//! Unparseable strings fall back to [`DEFAULT_LIFETIME`] instead of failing.
//! Configuration loading uses [`parse_duration`] to log the fallback once.

use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;

use crate::types::Timestamp;

/// Lifetime applied when a value does not match `<int>[smhd]`.
pub const DEFAULT_LIFETIME: Duration = Duration::hours(2);

/// Longest accepted lifetime. Larger values are treated as malformed.
pub const MAX_LIFETIME: Duration = Duration::days(3650);

static LIFETIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smhd])$").expect("static regex is valid"));

/// Strictly parse a lifetime string. Returns `None` for anything that is not
/// `<int>[smhd]` or that exceeds [`MAX_LIFETIME`].
pub fn parse_duration(value: &str) -> Option<Duration> {
    let caps = LIFETIME_RE.captures(value.trim())?;
    let amount: i64 = caps[1].parse().ok()?;
    let lifetime = match &caps[2] {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => None,
    }?;
    (lifetime <= MAX_LIFETIME).then_some(lifetime)
}

/// Parse a lifetime string, using [`DEFAULT_LIFETIME`] on failure.
pub fn lifetime_or_default(value: &str) -> Duration {
    parse_duration(value).unwrap_or(DEFAULT_LIFETIME)
}

/// Compute the absolute expiry for a lifetime string relative to `now`.
pub fn compute_expiry(value: &str, now: Timestamp) -> Timestamp {
    now.checked_add_signed(lifetime_or_default(value))
        .unwrap_or(now + DEFAULT_LIFETIME)
}

/// Seconds from `now` until `expires_at`, floored at 1 so a cache TTL is
/// never zero or negative.
pub fn ttl_secs(expires_at: Timestamp, now: Timestamp) -> u64 {
    let secs = (expires_at - now).num_seconds();
    if secs > 0 {
        secs as u64
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("45s"), Some(Duration::seconds(45)));
        assert_eq!(parse_duration("30m"), Some(Duration::minutes(30)));
        assert_eq!(parse_duration("2h"), Some(Duration::hours(2)));
        assert_eq!(parse_duration("7d"), Some(Duration::days(7)));
    }

    #[test]
    fn rejects_malformed_strings() {
        for value in ["", "h", "2", "2w", "-2h", "2.5h", "2 h", "two hours"] {
            assert_eq!(parse_duration(value), None, "value {value:?} should not parse");
        }
    }

    #[test]
    fn malformed_string_falls_back_to_two_hours() {
        let now = Utc::now();
        assert_eq!(compute_expiry("forever", now), now + Duration::hours(2));
    }

    #[test]
    fn oversized_lifetime_is_rejected_and_falls_back() {
        assert_eq!(parse_duration("3650d"), Some(Duration::days(3650)));
        assert_eq!(parse_duration("3651d"), None);
        assert_eq!(parse_duration("100000000d"), None);
        assert_eq!(parse_duration("99999999999999999999s"), None);

        let now = Utc::now();
        assert_eq!(compute_expiry("100000000d", now), now + Duration::hours(2));
    }

    #[test]
    fn compute_expiry_uses_parsed_lifetime() {
        let now = Utc::now();
        assert_eq!(compute_expiry("15m", now), now + Duration::minutes(15));
    }

    #[test]
    fn ttl_is_floored_at_one_second() {
        let now = Utc::now();
        assert_eq!(ttl_secs(now - Duration::minutes(5), now), 1);
        assert_eq!(ttl_secs(now, now), 1);
        assert_eq!(ttl_secs(now + Duration::seconds(90), now), 90);
    }
}
