//! Error types for time-series synthesis

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TimeseriesError {
    #[error("unknown point type: {0}")]
    UnknownPointType(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("point index {index} out of range for {len} points")]
    PointOutOfRange { index: usize, len: usize },
}

pub type TimeseriesResult<T> = Result<T, TimeseriesError>;
