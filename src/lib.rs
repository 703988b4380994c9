//! BOS Bench
//!
//! A reproducible benchmark of relational, property-graph and RDF engines on
//! a synthetic building-operations dataset: a building graph with its
//! telemetry, generated deterministically from a profile and a seed.
//!
//! # Pipeline
//!
//! - [`generator`] builds the structural graph; `bosbench-timeseries`
//!   synthesises the point trajectories
//! - [`export`] writes the Parquet pivot once and derives each scenario's
//!   files from it on demand
//! - [`container`] starts the engines under a hard RAM cap
//! - [`loader`] bulk-loads a scenario and verifies the counts
//! - [`params`] and [`query`] mint the query variants and measure them
//! - [`monitor`] samples container memory and CPU meanwhile
//! - [`results`] and [`orchestrator`] record runs and drive resumable sessions
//!
//! # Example
//!
//! ```no_run
//! use bosbench::model::{Duration, Profile, Scale, Scenario};
//! use bosbench::orchestrator::{Interrupt, Orchestrator, SessionOptions};
//!
//! # async fn run() -> bosbench::BenchResult<()> {
//! let options = SessionOptions::new(
//!     vec![Scenario::P1],
//!     vec![Profile::new(Scale::Small, Duration::TwoDays)],
//!     vec![8],
//! );
//! let report = Orchestrator::new(options, Interrupt::listen()).run_session().await?;
//! println!("{} runs, all completed: {}", report.runs.len(), report.all_completed());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod export;
pub mod generator;
pub mod loader;
pub mod model;
pub mod monitor;
pub mod orchestrator;
pub mod params;
pub mod query;
pub mod results;

pub use config::BenchConfig;
pub use error::{BenchError, BenchResult, ErrorKind};
pub use model::{Profile, Scenario};

/// Version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
