//! Common scalar types used throughout Bulwark.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp wrapper for consistent handling throughout Bulwark.
///
/// Serializes as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Get the current timestamp.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from a `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Check if this timestamp is in the past.
    #[must_use]
    pub fn is_past(&self) -> bool {
        self.0 < Utc::now()
    }

    /// Check if this timestamp is at or before `now`.
    #[must_use]
    pub fn is_at_or_before(&self, now: DateTime<Utc>) -> bool {
        self.0 <= now
    }

    /// The timestamp shifted forward by `delta`, saturating at the maximum
    /// representable time.
    #[must_use]
    pub fn plus(&self, delta: Duration) -> Self {
        Self(self.0.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Risk score on a 1-10 scale, used for audit and UI prioritization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RiskScore(u8);

impl RiskScore {
    /// Lowest possible score.
    pub const MIN: Self = Self(1);
    /// Highest possible score.
    pub const MAX: Self = Self(10);

    /// Create a score, returning `None` outside `1..=10`.
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value >= 1 && value <= 10 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create a score, clamping into `1..=10`.
    #[must_use]
    pub const fn clamped(value: u8) -> Self {
        if value < 1 {
            Self::MIN
        } else if value > 10 {
            Self::MAX
        } else {
            Self(value)
        }
    }

    /// The raw score.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Scores of 7 and above are considered high risk.
    #[must_use]
    pub const fn is_high(self) -> bool {
        self.0 >= 7
    }
}

impl TryFrom<u8> for RiskScore {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("risk score {value} is outside 1..=10"))
    }
}

impl From<RiskScore> for u8 {
    fn from(score: RiskScore) -> Self {
        score.0
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/10", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_serializes_as_rfc3339() {
        let ts = Timestamp::from_datetime(
            DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-05-01T12:00:00Z\"");
    }

    #[test]
    fn test_timestamp_plus_saturates() {
        let ts = Timestamp::from_datetime(DateTime::<Utc>::MAX_UTC);
        assert_eq!(ts.plus(Duration::hours(1)).0, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_risk_score_bounds() {
        assert!(RiskScore::new(0).is_none());
        assert!(RiskScore::new(11).is_none());
        assert_eq!(RiskScore::new(5).unwrap().get(), 5);
        assert_eq!(RiskScore::clamped(0), RiskScore::MIN);
        assert_eq!(RiskScore::clamped(200), RiskScore::MAX);
    }

    #[test]
    fn test_risk_score_rejects_out_of_range_json() {
        assert!(serde_json::from_str::<RiskScore>("0").is_err());
        assert!(serde_json::from_str::<RiskScore>("11").is_err());
        assert_eq!(serde_json::from_str::<RiskScore>("7").unwrap().get(), 7);
    }
}
