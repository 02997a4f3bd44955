// =====================================================================================
// File: core-threat-intel/src/types.rs
// Description: Value objects for feeds and threats
// =====================================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Feed priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeedPriority {
    P0,
    P1,
    P2,
    P3,
}

impl fmt::Display for FeedPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedPriority::P0 => write!(f, "P0"),
            FeedPriority::P1 => write!(f, "P1"),
            FeedPriority::P2 => write!(f, "P2"),
            FeedPriority::P3 => write!(f, "P3"),
        }
    }
}

/// Collection cadence for a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionFrequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl CollectionFrequency {
    /// Timer period for this cadence. A month is simplified to four weeks.
    pub fn as_duration(&self) -> Duration {
        const HOUR: u64 = 60 * 60;
        match self {
            CollectionFrequency::Hourly => Duration::from_secs(HOUR),
            CollectionFrequency::Daily => Duration::from_secs(24 * HOUR),
            CollectionFrequency::Weekly => Duration::from_secs(7 * 24 * HOUR),
            CollectionFrequency::Monthly => Duration::from_secs(4 * 7 * 24 * HOUR),
        }
    }
}

impl fmt::Display for CollectionFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionFrequency::Hourly => write!(f, "hourly"),
            CollectionFrequency::Daily => write!(f, "daily"),
            CollectionFrequency::Weekly => write!(f, "weekly"),
            CollectionFrequency::Monthly => write!(f, "monthly"),
        }
    }
}

/// Outcome of the most recent collection run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionStatus {
    Success,
    Failed,
    InProgress,
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionStatus::Success => write!(f, "success"),
            CollectionStatus::Failed => write!(f, "failed"),
            CollectionStatus::InProgress => write!(f, "in-progress"),
        }
    }
}

/// Severity tag as authored by the advisory source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatSeverity {
    /// CVSS to severity map: [0,4) Low, [4,7) Medium, [7,9) High, [9,10] Critical.
    pub fn from_cvss(score: f64) -> Self {
        if score >= 9.0 {
            ThreatSeverity::Critical
        } else if score >= 7.0 {
            ThreatSeverity::High
        } else if score >= 4.0 {
            ThreatSeverity::Medium
        } else {
            ThreatSeverity::Low
        }
    }
}

impl fmt::Display for ThreatSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreatSeverity::Low => write!(f, "Low"),
            ThreatSeverity::Medium => write!(f, "Medium"),
            ThreatSeverity::High => write!(f, "High"),
            ThreatSeverity::Critical => write!(f, "Critical"),
        }
    }
}

/// Threat lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreatStatus {
    New,
    Analyzing,
    Processed,
    Closed,
}

impl ThreatStatus {
    /// Allowed transitions:
    /// New -> {Analyzing, Closed}; Analyzing -> {Processed, Closed};
    /// Processed -> {Closed}; Closed is terminal.
    pub fn can_transition_to(&self, target: ThreatStatus) -> bool {
        matches!(
            (self, target),
            (ThreatStatus::New, ThreatStatus::Analyzing)
                | (ThreatStatus::New, ThreatStatus::Closed)
                | (ThreatStatus::Analyzing, ThreatStatus::Processed)
                | (ThreatStatus::Analyzing, ThreatStatus::Closed)
                | (ThreatStatus::Processed, ThreatStatus::Closed)
        )
    }
}

impl fmt::Display for ThreatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreatStatus::New => write!(f, "New"),
            ThreatStatus::Analyzing => write!(f, "Analyzing"),
            ThreatStatus::Processed => write!(f, "Processed"),
            ThreatStatus::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_cvss_boundaries() {
        assert_eq!(ThreatSeverity::from_cvss(3.9), ThreatSeverity::Low);
        assert_eq!(ThreatSeverity::from_cvss(4.0), ThreatSeverity::Medium);
        assert_eq!(ThreatSeverity::from_cvss(6.9), ThreatSeverity::Medium);
        assert_eq!(ThreatSeverity::from_cvss(7.0), ThreatSeverity::High);
        assert_eq!(ThreatSeverity::from_cvss(8.9), ThreatSeverity::High);
        assert_eq!(ThreatSeverity::from_cvss(9.0), ThreatSeverity::Critical);
        assert_eq!(ThreatSeverity::from_cvss(10.0), ThreatSeverity::Critical);
        assert_eq!(ThreatSeverity::from_cvss(0.0), ThreatSeverity::Low);
    }

    #[test]
    fn test_threat_status_transitions() {
        use ThreatStatus::*;
        assert!(New.can_transition_to(Analyzing));
        assert!(New.can_transition_to(Closed));
        assert!(Analyzing.can_transition_to(Processed));
        assert!(Analyzing.can_transition_to(Closed));
        assert!(Processed.can_transition_to(Closed));

        assert!(!New.can_transition_to(Processed));
        assert!(!Processed.can_transition_to(Analyzing));
        assert!(!Closed.can_transition_to(New));
        assert!(!Closed.can_transition_to(Analyzing));
        assert!(!Analyzing.can_transition_to(New));
    }

    #[test]
    fn test_frequency_durations() {
        assert_eq!(
            CollectionFrequency::Hourly.as_duration(),
            Duration::from_secs(3600)
        );
        assert_eq!(
            CollectionFrequency::Monthly.as_duration(),
            CollectionFrequency::Weekly.as_duration() * 4
        );
    }
}
