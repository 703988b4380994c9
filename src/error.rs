//! Error types
//!
//! Every failure maps onto one [`ErrorKind`], the unit the checkpoint and the
//! run results record. Query errors are caught per query and never abort a
//! run; every other kind aborts the run it occurs in.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::engine::EngineError;

/// Serialisable classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Export,
    ContainerStart,
    Oom,
    LoadTimeout,
    Stalled,
    LoadError,
    QueryError,
    Teardown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Export => "export",
            ErrorKind::ContainerStart => "container_start",
            ErrorKind::Oom => "oom",
            ErrorKind::LoadTimeout => "load_timeout",
            ErrorKind::Stalled => "stalled",
            ErrorKind::LoadError => "load_error",
            ErrorKind::QueryError => "query_error",
            ErrorKind::Teardown => "teardown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Container did not start: {0}")]
    ContainerStart(String),

    #[error("Container out of memory: {0}")]
    Oom(String),

    #[error("Load batch timed out: {0}")]
    LoadTimeout(String),

    #[error("Load stalled: {0}")]
    Stalled(String),

    #[error("Load rejected: {0}")]
    LoadError(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Teardown failed: {0}")]
    Teardown(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Time-series error: {0}")]
    Timeseries(#[from] bosbench_timeseries::TimeseriesError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl BenchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BenchError::Config(_) => ErrorKind::Config,
            BenchError::Export(_)
            | BenchError::Io(_)
            | BenchError::Json(_)
            | BenchError::Csv(_)
            | BenchError::Arrow(_)
            | BenchError::Parquet(_)
            | BenchError::Timeseries(_) => ErrorKind::Export,
            BenchError::ContainerStart(_) => ErrorKind::ContainerStart,
            BenchError::Oom(_) => ErrorKind::Oom,
            BenchError::LoadTimeout(_) => ErrorKind::LoadTimeout,
            BenchError::Stalled(_) => ErrorKind::Stalled,
            BenchError::LoadError(_) | BenchError::Engine(_) => ErrorKind::LoadError,
            BenchError::QueryError(_) => ErrorKind::QueryError,
            BenchError::Teardown(_) => ErrorKind::Teardown,
        }
    }

    /// Whether the error aborts the run it occurs in
    pub fn aborts_run(&self) -> bool {
        !matches!(self.kind(), ErrorKind::QueryError | ErrorKind::Teardown)
    }
}

pub type BenchResult<T> = Result<T, BenchError>;
