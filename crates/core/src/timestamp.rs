//! Millisecond-precision timestamp type
//!
//! Every snapshot key carries its creation time, so the whole system reasons
//! about time through this one type.
//!
//! ## Precision
//!
//! Timestamps are stored as milliseconds since Unix epoch (1970-01-01 00:00:00 UTC),
//! the precision a time-ordered snapshot key can hold. Second-precision values
//! (what the document store reports) are simply timestamps whose millisecond
//! part is zero, see [`Timestamp::is_second_aligned`].
//!
//! ## Usage
//!
//! ```
//! use datasync_core::Timestamp;
//!
//! let now = Timestamp::now();
//! let from_secs = Timestamp::from_secs(1000);
//! let from_millis = Timestamp::from_millis(1_000_500);
//! assert_eq!(from_millis.truncate_to_secs(), from_secs);
//! ```

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Millisecond-precision timestamp
///
/// ## Invariants
///
/// - Timestamps are always non-negative (u64)
/// - Timestamps are always in milliseconds
/// - The zero timestamp represents Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Largest value a snapshot key can encode (48 bits of milliseconds)
    pub const MAX_KEY_TIME: Timestamp = Timestamp((1 << 48) - 1);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a timestamp for the current moment
    ///
    /// Returns epoch if the system clock is before Unix epoch.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as u64)
    }

    /// Create a timestamp from milliseconds since epoch
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Create a timestamp from seconds since epoch
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000))
    }

    /// Parse a user-supplied point in time.
    ///
    /// Accepts RFC 3339 (`2024-05-01T12:00:00Z`), `YYYY-MM-DD HH:MM:SS`
    /// interpreted as UTC, or plain epoch seconds.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
            return Self::from_datetime(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
            return Self::from_datetime(Utc.from_utc_datetime(&naive));
        }
        input.parse::<u64>().ok().map(Self::from_secs)
    }

    fn from_datetime(dt: DateTime<Utc>) -> Option<Self> {
        u64::try_from(dt.timestamp_millis()).ok().map(Timestamp)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get milliseconds since Unix epoch
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get seconds since Unix epoch (truncates)
    #[inline]
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1_000
    }

    /// Drop the sub-second part
    #[inline]
    pub const fn truncate_to_secs(&self) -> Self {
        Timestamp((self.0 / 1_000) * 1_000)
    }

    /// True if this timestamp has no sub-second part
    #[inline]
    pub const fn is_second_aligned(&self) -> bool {
        self.0 % 1_000 == 0
    }

    /// Equality rule used by the embedded store.
    ///
    /// Two timestamps match when they are identical, or when at least one of
    /// them is already second-aligned and both fall in the same second. Two
    /// unaligned values in the same second do NOT match.
    pub fn matches_lenient(&self, other: Timestamp) -> bool {
        if self.0 == other.0 {
            return true;
        }
        let (a_rounded, b_rounded) = (self.truncate_to_secs(), other.truncate_to_secs());
        (self.is_second_aligned() || other.is_second_aligned()) && a_rounded == b_rounded
    }

    // =========================================================================
    // Duration Operations
    // =========================================================================

    /// Compute duration since an earlier timestamp
    ///
    /// Returns `None` if `earlier` is actually later than `self`.
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        if self.0 >= earlier.0 {
            Some(Duration::from_millis(self.0 - earlier.0))
        } else {
            None
        }
    }

    /// Subtract a duration from this timestamp
    ///
    /// Saturates at `Timestamp::EPOCH` on underflow.
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration.as_millis() as u64))
    }

    /// Add a duration to this timestamp
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_millis() as u64))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match Utc.timestamp_millis_opt(self.0 as i64).single() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl From<Duration> for Timestamp {
    /// Create from duration since epoch
    fn from(duration: Duration) -> Self {
        Timestamp::from_millis(duration.as_millis() as u64)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_from_secs() {
        let ts = Timestamp::from_secs(1000);
        assert_eq!(ts.as_secs(), 1000);
        assert_eq!(ts.as_millis(), 1_000_000);
        assert!(ts.is_second_aligned());
    }

    #[test]
    fn test_timestamp_truncate() {
        let ts = Timestamp::from_millis(5_999);
        assert_eq!(ts.truncate_to_secs(), Timestamp::from_secs(5));
        assert!(!ts.is_second_aligned());
    }

    #[test]
    fn test_timestamp_now_advances() {
        let before = Timestamp::now();
        std::thread::sleep(Duration::from_millis(2));
        let after = Timestamp::now();
        assert!(after > before, "Time should advance");
    }

    #[test]
    fn test_lenient_exact_match() {
        let a = Timestamp::from_millis(1_000);
        assert!(a.matches_lenient(Timestamp::from_millis(1_000)));
    }

    #[test]
    fn test_lenient_one_side_aligned() {
        let aligned = Timestamp::from_millis(1_000);
        let within = Timestamp::from_millis(1_500);
        assert!(aligned.matches_lenient(within));
        assert!(within.matches_lenient(aligned));
    }

    #[test]
    fn test_lenient_neither_aligned() {
        let a = Timestamp::from_millis(1_001);
        let b = Timestamp::from_millis(1_999);
        assert!(!a.matches_lenient(b));
    }

    #[test]
    fn test_lenient_different_seconds() {
        let a = Timestamp::from_millis(1_000);
        let b = Timestamp::from_millis(2_500);
        assert!(!a.matches_lenient(b));
    }

    #[test]
    fn test_timestamp_duration_since() {
        let t1 = Timestamp::from_millis(1000);
        let t2 = Timestamp::from_millis(3000);
        assert_eq!(t2.duration_since(t1), Some(Duration::from_millis(2000)));
        assert!(t1.duration_since(t2).is_none());
    }

    #[test]
    fn test_timestamp_saturating_sub() {
        let ts = Timestamp::from_millis(1000);
        assert_eq!(
            ts.saturating_sub(Duration::from_millis(400)),
            Timestamp::from_millis(600)
        );
        assert_eq!(
            Timestamp::EPOCH.saturating_sub(Duration::from_millis(1)),
            Timestamp::EPOCH
        );
    }

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::from_millis(1_500);
        assert_eq!(ts.to_string(), "1970-01-01T00:00:01.500Z");
    }

    #[test]
    fn test_parse_formats() {
        let expected = Timestamp::from_secs(1_714_564_800);
        assert_eq!(Timestamp::parse("2024-05-01T12:00:00Z"), Some(expected));
        assert_eq!(Timestamp::parse("2024-05-01 12:00:00"), Some(expected));
        assert_eq!(Timestamp::parse("1714564800"), Some(expected));
        assert_eq!(Timestamp::parse("yesterday"), None);
    }

    #[test]
    fn test_timestamp_serialization() {
        let ts = Timestamp::from_millis(1_234_567);
        let json = serde_json::to_string(&ts).unwrap();
        let restored: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, restored);
    }
}
