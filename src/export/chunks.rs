//! Day chunks: one point's samples for one UTC day as parallel arrays

use std::path::Path;

use chrono::{DateTime, NaiveDate};
use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::export::pivot;
use crate::model::Sample;

pub const CHUNK_COLUMNS: [&str; 4] = ["point_id", "day", "timestamps", "values"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub point_id: String,
    pub day: NaiveDate,
    /// Unix seconds, ascending
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
}

impl Chunk {
    pub fn day_string(&self) -> String {
        self.day.format("%Y-%m-%d").to_string()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps_json(&self) -> BenchResult<String> {
        Ok(serde_json::to_string(&self.timestamps)?)
    }

    pub fn values_json(&self) -> BenchResult<String> {
        Ok(serde_json::to_string(&self.values)?)
    }

    /// Parse a row of `mg_chunks.csv`.
    pub fn from_record(record: &StringRecord) -> BenchResult<Self> {
        let field = |i: usize| {
            record
                .get(i)
                .ok_or_else(|| BenchError::Export(format!("chunk row has no column {}", CHUNK_COLUMNS[i])))
        };
        let day = NaiveDate::parse_from_str(field(1)?, "%Y-%m-%d")
            .map_err(|e| BenchError::Export(format!("bad chunk day: {}", e)))?;
        Ok(Self {
            point_id: field(0)?.to_string(),
            day,
            timestamps: serde_json::from_str(field(2)?)?,
            values: serde_json::from_str(field(3)?)?,
        })
    }
}

/// UTC calendar day of a timestamp
pub fn day_of(time_micros: i64) -> BenchResult<NaiveDate> {
    DateTime::from_timestamp_micros(time_micros)
        .map(|t| t.date_naive())
        .ok_or_else(|| BenchError::Export(format!("timestamp out of range: {}", time_micros)))
}

/// Groups a `(point_id, time)`-ordered sample stream into day chunks.
#[derive(Debug, Default)]
pub struct ChunkBuilder {
    current: Option<Chunk>,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample; returns the previous chunk once the point or day changes.
    pub fn push(&mut self, sample: &Sample) -> BenchResult<Option<Chunk>> {
        let day = day_of(sample.time_micros)?;
        let seconds = sample.time_micros.div_euclid(1_000_000);

        if let Some(chunk) = self.current.as_mut() {
            if chunk.point_id == sample.point_id && chunk.day == day {
                chunk.timestamps.push(seconds);
                chunk.values.push(sample.value);
                return Ok(None);
            }
        }
        let fresh = Chunk {
            point_id: sample.point_id.clone(),
            day,
            timestamps: vec![seconds],
            values: vec![sample.value],
        };
        Ok(self.current.replace(fresh))
    }

    pub fn finish(self) -> Option<Chunk> {
        self.current
    }
}

/// Walk the time-series pivot chunk by chunk.
pub fn for_each_chunk<F>(timeseries_parquet: &Path, mut f: F) -> BenchResult<usize>
where
    F: FnMut(Chunk) -> BenchResult<()>,
{
    let mut builder = ChunkBuilder::new();
    let mut count = 0;
    pivot::for_each_sample_batch(timeseries_parquet, |batch| {
        for sample in &batch {
            if let Some(chunk) = builder.push(sample)? {
                f(chunk)?;
                count += 1;
            }
        }
        Ok(())
    })?;
    if let Some(chunk) = builder.finish() {
        f(chunk)?;
        count += 1;
    }
    Ok(count)
}

pub fn write_mg_chunks(path: &Path, timeseries_parquet: &Path) -> BenchResult<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CHUNK_COLUMNS)?;
    let count = for_each_chunk(timeseries_parquet, |chunk| {
        writer.write_record([
            chunk.point_id.clone(),
            chunk.day_string(),
            chunk.timestamps_json()?,
            chunk.values_json()?,
        ])?;
        Ok(())
    })?;
    writer.flush()?;
    Ok(count)
}
