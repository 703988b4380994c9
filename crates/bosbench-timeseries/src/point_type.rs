//! Physical point types and their default process parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TimeseriesError;

/// Physical type of a telemetry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PointType {
    Temperature,
    Humidity,
    Pressure,
    Co2,
    Position,
    Power,
    Energy,
    Status,
    Alarm,
    Speed,
    Flow,
}

/// How a point type turns its trajectory into samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Emission {
    /// Continuous OU trajectory, emitted through the deadband filter.
    Deadband,
    /// Cumulative meter reading, emitted on a fixed step interval.
    Interval(u32),
    /// Two-state signal, emitted on transitions only.
    Transitions,
}

/// Default parameters of a point type.
///
/// `theta` is the mean-reversion rate in 1/hour and `sigma` the volatility in
/// value units per sqrt(hour). `spread` bounds the per-point offset applied to
/// `mean` so that points of the same type do not share one level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeParams {
    pub mean: f64,
    pub theta: f64,
    pub sigma: f64,
    pub deadband: f64,
    pub lower: f64,
    pub upper: f64,
    pub spread: f64,
}

/// Fixed sampling interval for energy meters, in base steps (minutes).
pub const METER_INTERVAL_STEPS: u32 = 15;

/// Minimum number of steps a status point holds its state.
pub const STATUS_MIN_DWELL_STEPS: u32 = 15;

/// Per-minute probability that an inactive alarm raises.
pub const ALARM_RAISE_PROBABILITY: f64 = 0.0005;

/// Per-minute probability that an active alarm clears.
pub const ALARM_CLEAR_PROBABILITY: f64 = 0.05;

/// Range of per-minute base consumption for energy meters (kWh/min).
pub const METER_BASE_RATE: (f64, f64) = (0.05, 2.0);

/// Relative volatility of meter consumption per step.
pub const METER_NOISE: f64 = 0.1;

impl PointType {
    pub const ALL: [PointType; 11] = [
        PointType::Temperature,
        PointType::Humidity,
        PointType::Pressure,
        PointType::Co2,
        PointType::Position,
        PointType::Power,
        PointType::Energy,
        PointType::Status,
        PointType::Alarm,
        PointType::Speed,
        PointType::Flow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PointType::Temperature => "temperature",
            PointType::Humidity => "humidity",
            PointType::Pressure => "pressure",
            PointType::Co2 => "co2",
            PointType::Position => "position",
            PointType::Power => "power",
            PointType::Energy => "energy",
            PointType::Status => "status",
            PointType::Alarm => "alarm",
            PointType::Speed => "speed",
            PointType::Flow => "flow",
        }
    }

    /// Engineering unit used when the generator labels the point.
    pub fn unit(&self) -> &'static str {
        match self {
            PointType::Temperature => "degC",
            PointType::Humidity => "percentRH",
            PointType::Pressure => "Pa",
            PointType::Co2 => "ppm",
            PointType::Position => "percent",
            PointType::Power => "kW",
            PointType::Energy => "kWh",
            PointType::Status => "bool",
            PointType::Alarm => "bool",
            PointType::Speed => "percent",
            PointType::Flow => "m3/h",
        }
    }

    pub fn params(&self) -> TypeParams {
        let p = |mean, theta, sigma, deadband, lower, upper, spread| TypeParams {
            mean,
            theta,
            sigma,
            deadband,
            lower,
            upper,
            spread,
        };
        match self {
            PointType::Temperature => p(21.5, 0.5, 0.8, 0.2, 10.0, 35.0, 2.0),
            PointType::Humidity => p(45.0, 0.3, 3.0, 1.0, 15.0, 85.0, 8.0),
            PointType::Pressure => p(250.0, 1.0, 20.0, 5.0, 0.0, 600.0, 50.0),
            PointType::Co2 => p(600.0, 0.4, 80.0, 20.0, 400.0, 2000.0, 100.0),
            PointType::Position => p(50.0, 0.8, 15.0, 2.0, 0.0, 100.0, 20.0),
            PointType::Power => p(15.0, 0.6, 3.0, 0.5, 0.0, 200.0, 10.0),
            // Meters are cumulative; the OU columns are unused except for noise.
            PointType::Energy => p(0.0, 0.0, 0.0, 0.0, 0.0, f64::MAX, 0.0),
            PointType::Status => p(0.5, 0.2, 0.35, 0.5, 0.0, 1.0, 0.0),
            PointType::Alarm => p(0.0, 0.0, 0.0, 0.5, 0.0, 1.0, 0.0),
            PointType::Speed => p(60.0, 0.7, 10.0, 2.0, 0.0, 100.0, 15.0),
            PointType::Flow => p(1200.0, 0.5, 150.0, 25.0, 0.0, 5000.0, 300.0),
        }
    }

    pub fn emission(&self) -> Emission {
        match self {
            PointType::Energy => Emission::Interval(METER_INTERVAL_STEPS),
            PointType::Status | PointType::Alarm => Emission::Transitions,
            _ => Emission::Deadband,
        }
    }

    /// Deadband applied by the filter; zero for interval-sampled meters.
    pub fn deadband(&self) -> f64 {
        match self.emission() {
            Emission::Interval(_) => 0.0,
            _ => self.params().deadband,
        }
    }

    /// Classify a point from its name and the type of its host equipment.
    ///
    /// Name tokens win over equipment context; an unrecognised point on a
    /// metering device is treated as an energy register.
    pub fn classify(name: &str, equipment_type: Option<&str>) -> PointType {
        let name = name.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| name.contains(n));

        if has(&["alarm", "fault", "trip"]) {
            PointType::Alarm
        } else if has(&["energy", "kwh", "consumption", "register"]) {
            PointType::Energy
        } else if has(&["co2", "carbon"]) {
            PointType::Co2
        } else if has(&["humid", "rh"]) {
            PointType::Humidity
        } else if has(&["temp", "tmp"]) {
            PointType::Temperature
        } else if has(&["press", "dp"]) {
            PointType::Pressure
        } else if has(&["power", "kw", "demand"]) {
            PointType::Power
        } else if has(&["flow", "cfm"]) {
            PointType::Flow
        } else if has(&["speed", "freq", "vfd"]) {
            PointType::Speed
        } else if has(&["position", "damper", "valve", "dim", "level"]) {
            PointType::Position
        } else if has(&["status", "cmd", "command", "run", "occupancy", "onoff", "enable"]) {
            PointType::Status
        } else {
            match equipment_type.map(|t| t.to_ascii_lowercase()) {
                Some(t) if t.contains("meter") => PointType::Energy,
                Some(t) if t.contains("light") => PointType::Status,
                Some(t) if t.contains("pump") || t.contains("fan") => PointType::Speed,
                _ => PointType::Temperature,
            }
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PointType {
    type Err = TimeseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PointType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TimeseriesError::UnknownPointType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_name() {
        assert_eq!(PointType::classify("Supply Air Temp", None), PointType::Temperature);
        assert_eq!(PointType::classify("Zone CO2", None), PointType::Co2);
        assert_eq!(PointType::classify("Return Air Humidity", None), PointType::Humidity);
        assert_eq!(PointType::classify("Filter Alarm", None), PointType::Alarm);
        assert_eq!(PointType::classify("Damper Position", None), PointType::Position);
        assert_eq!(PointType::classify("Fan Run Status", None), PointType::Status);
        assert_eq!(PointType::classify("Active Energy", None), PointType::Energy);
    }

    #[test]
    fn test_classify_falls_back_to_equipment() {
        assert_eq!(PointType::classify("Register 3", Some("ElecMeter")), PointType::Energy);
        assert_eq!(PointType::classify("Channel A", Some("ElecMeter")), PointType::Energy);
        assert_eq!(PointType::classify("Output", Some("Pump")), PointType::Speed);
        assert_eq!(PointType::classify("Output", None), PointType::Temperature);
    }

    #[test]
    fn test_round_trip_names() {
        for t in PointType::ALL {
            assert_eq!(t.as_str().parse::<PointType>().unwrap(), t);
        }
        assert!("bogus".parse::<PointType>().is_err());
    }

    #[test]
    fn test_params_are_consistent() {
        for t in PointType::ALL {
            let p = t.params();
            assert!(p.lower <= p.upper, "{t}");
            if t.emission() == Emission::Deadband {
                assert!(p.theta > 0.0, "{t}");
                assert!(p.deadband > 0.0, "{t}");
                assert!(p.mean >= p.lower && p.mean <= p.upper, "{t}");
            }
        }
        assert_eq!(PointType::Energy.deadband(), 0.0);
    }
}
