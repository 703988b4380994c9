//! Dataset size presets
//!
//! A profile is `<scale>-<duration>` (for example `small-2d`). The scale fixes
//! the structural counts and the measurement protocol; the duration fixes the
//! length of the time-series.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BenchError;

/// Unix seconds of the dataset epoch, 2024-01-01T00:00:00Z.
pub const EPOCH_UNIX_SECONDS: i64 = 1_704_067_200;

/// Base step of every trajectory.
pub const STEP_SECONDS: i64 = 60;

pub const STEPS_PER_DAY: usize = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Small,
    Medium,
    Large,
}

impl Scale {
    pub const ALL: [Scale; 3] = [Scale::Small, Scale::Medium, Scale::Large];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Small => "small",
            Scale::Medium => "medium",
            Scale::Large => "large",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Duration {
    #[serde(rename = "2d")]
    TwoDays,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl Duration {
    pub const ALL: [Duration; 5] = [
        Duration::TwoDays,
        Duration::OneWeek,
        Duration::OneMonth,
        Duration::SixMonths,
        Duration::OneYear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Duration::TwoDays => "2d",
            Duration::OneWeek => "1w",
            Duration::OneMonth => "1m",
            Duration::SixMonths => "6m",
            Duration::OneYear => "1y",
        }
    }

    pub fn days(&self) -> u32 {
        match self {
            Duration::TwoDays => 2,
            Duration::OneWeek => 7,
            Duration::OneMonth => 30,
            Duration::SixMonths => 182,
            Duration::OneYear => 365,
        }
    }
}

/// Warmup, measurement and variant counts of the query protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub warmup: usize,
    pub measure: usize,
    pub variants: usize,
}

/// Concrete target counts a profile resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCounts {
    pub buildings: usize,
    pub floors: usize,
    pub spaces: usize,
    pub equipment: usize,
    pub points: usize,
    pub meters: usize,
    pub tenants: usize,
    pub duration_days: u32,
}

impl ProfileCounts {
    /// Number of one-minute steps in the series
    pub fn n_steps(&self) -> usize {
        self.duration_days as usize * STEPS_PER_DAY
    }
}

/// A named size preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Profile {
    pub scale: Scale,
    pub duration: Duration,
}

impl Profile {
    pub fn new(scale: Scale, duration: Duration) -> Self {
        Profile { scale, duration }
    }

    pub fn counts(&self) -> ProfileCounts {
        let (buildings, floors, spaces, equipment, points, meters, tenants) = match self.scale {
            Scale::Small => (2, 10, 100, 200, 1_000, 20, 10),
            Scale::Medium => (5, 50, 1_000, 2_000, 10_000, 100, 50),
            Scale::Large => (20, 200, 5_000, 10_000, 50_000, 500, 200),
        };
        ProfileCounts {
            buildings,
            floors,
            spaces,
            equipment,
            points,
            meters,
            tenants,
            duration_days: self.duration.days(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        let (warmup, measure, variants) = match self.scale {
            Scale::Small => (3, 10, 3),
            Scale::Medium => (3, 30, 5),
            Scale::Large => (3, 100, 10),
        };
        Protocol {
            warmup,
            measure,
            variants,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.scale.as_str(), self.duration.as_str())
    }
}

impl FromStr for Profile {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (scale, duration) = s
            .split_once('-')
            .ok_or_else(|| BenchError::Config(format!("profile must be <scale>-<duration>: {}", s)))?;
        let scale = Scale::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == scale)
            .ok_or_else(|| BenchError::Config(format!("unknown scale: {}", scale)))?;
        let duration = Duration::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == duration)
            .ok_or_else(|| BenchError::Config(format!("unknown duration: {}", duration)))?;
        Ok(Profile { scale, duration })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profiles() {
        let p: Profile = "small-2d".parse().unwrap();
        assert_eq!(p, Profile::new(Scale::Small, Duration::TwoDays));
        assert_eq!(p.to_string(), "small-2d");
        assert_eq!("Medium-1W".parse::<Profile>().unwrap().to_string(), "medium-1w");
        assert!("tiny-2d".parse::<Profile>().is_err());
        assert!("small".parse::<Profile>().is_err());
        assert!("small-3d".parse::<Profile>().is_err());
    }

    #[test]
    fn test_counts_table() {
        let c = Profile::new(Scale::Large, Duration::OneYear).counts();
        assert_eq!(c.points, 50_000);
        assert_eq!(c.meters, 500);
        assert_eq!(c.duration_days, 365);
        assert_eq!(Profile::new(Scale::Small, Duration::TwoDays).counts().n_steps(), 2880);
    }

    #[test]
    fn test_protocol_scales() {
        let p = Profile::new(Scale::Medium, Duration::OneWeek).protocol();
        assert_eq!((p.warmup, p.measure, p.variants), (3, 30, 5));
    }
}
