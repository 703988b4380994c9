//! Synthetic building telemetry
//!
//! Classifies points into physical types, advances Ornstein–Uhlenbeck
//! trajectories for all points of a partition at once, and reduces each
//! trajectory to the samples a deadband-configured BMS would have recorded.

pub mod deadband;
pub mod error;
pub mod generator;
pub mod point_type;
pub mod process;
pub mod rng;

pub use deadband::EmittedSample;
pub use error::{TimeseriesError, TimeseriesResult};
pub use generator::{TimeseriesConfig, TimeseriesGenerator};
pub use point_type::{Emission, PointType, TypeParams};
pub use rng::derive_seed;
