//! Query executor
//!
//! Substitutes bindings literally and runs each text through the engine's
//! plain query path. Engine errors and timeouts are recorded on the query and
//! never abort the run.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::library::{substitute, POINT_IDS};
use super::{QueryLibrary, QueryRecord, QueryTemplate};
use crate::engine::{Connections, EngineClient};
use crate::error::{BenchError, BenchResult};
use crate::model::{Dialect, Engine, Protocol, Scenario};
use crate::params::{catalog, ParamGenerator, Variant};

/// `$POINT_IDS` for SQL: a quoted list, or `NULL` so `IN (NULL)` matches nothing
pub fn point_id_list(ids: &[String]) -> String {
    if ids.is_empty() {
        return "NULL".to_string();
    }
    ids.iter()
        .map(|id| format!("'{}'", id.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Texts of one variant with every binding but `$POINT_IDS` applied
#[derive(Debug, Clone)]
struct PreparedVariant {
    text: String,
    timeseries: Option<(String, BTreeMap<String, String>)>,
}

pub struct QueryExecutor<'a> {
    structural: &'a dyn EngineClient,
    timeseries: Option<&'a dyn EngineClient>,
    dialect: Dialect,
    protocol: Protocol,
    timeout: Duration,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(
        structural: &'a dyn EngineClient,
        timeseries: Option<&'a dyn EngineClient>,
        dialect: Dialect,
        protocol: Protocol,
        timeout: Duration,
    ) -> Self {
        Self {
            structural,
            timeseries,
            dialect,
            protocol,
            timeout,
        }
    }

    pub fn for_scenario(
        conns: &'a Connections,
        scenario: Scenario,
        protocol: Protocol,
        timeout: Duration,
    ) -> BenchResult<Self> {
        let dialect = scenario.dialect();
        let structural = conns
            .require(dialect.engine())
            .map_err(|e| BenchError::QueryError(e.to_string()))?;
        let timeseries = if scenario.is_hybrid() {
            Some(
                conns
                    .require(Engine::Relational)
                    .map_err(|e| BenchError::QueryError(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self::new(structural, timeseries, dialect, protocol, timeout))
    }

    /// Run every query of the library in order.
    pub async fn run_all(&self, library: &QueryLibrary, params: &ParamGenerator) -> Vec<QueryRecord> {
        let mut records = Vec::with_capacity(library.len());
        for template in &library.queries {
            let variants = match catalog::lookup(&template.id) {
                Some(spec) => params.variants(spec),
                None => Err(BenchError::QueryError(format!("{} is not in the query catalogue", template.id))),
            };
            let record = match variants {
                Ok(variants) => self.run_query(template, &variants).await,
                Err(e) => {
                    let mut record = QueryRecord::new(template);
                    record.errors.push(e.to_string());
                    record
                }
            };
            records.push(record);
        }
        records
    }

    /// Warmup then measurement for each variant.
    pub async fn run_query(&self, template: &QueryTemplate, variants: &[Variant]) -> QueryRecord {
        let mut record = QueryRecord::new(template);
        record.variants = variants.len();

        for variant in variants {
            let prepared = match self.prepare(template, variant) {
                Ok(p) => p,
                Err(e) => {
                    record.errors.push(format!("variant {}: {}", variant.index, e));
                    continue;
                }
            };
            for _ in 0..self.protocol.warmup {
                if let Err(e) = self.execute(&prepared).await {
                    debug!(query = %template.id, variant = variant.index, error = %e, "Warmup execution failed");
                }
            }
            for _ in 0..self.protocol.measure {
                let started = Instant::now();
                match self.execute(&prepared).await {
                    Ok(rows) => record.record(started.elapsed().as_secs_f64() * 1000.0, rows),
                    Err(e) => {
                        warn!(query = %template.id, variant = variant.index, error = %e, "Query failed");
                        record.errors.push(format!("variant {}: {}", variant.index, e));
                    }
                }
            }
        }

        record.finish();
        info!(
            query = %record.query_id,
            p50_ms = record.stats.p50_ms,
            p95_ms = record.stats.p95_ms,
            rows = record.row_count().unwrap_or(0),
            errors = record.errors.len(),
            "Query measured"
        );
        record
    }

    fn prepare(&self, template: &QueryTemplate, variant: &Variant) -> BenchResult<PreparedVariant> {
        let text = substitute(&template.text, &variant.bindings(self.dialect)?)?;
        let timeseries = match &template.timeseries_text {
            Some(ts) => Some((ts.clone(), variant.bindings(Dialect::Sql)?)),
            None => None,
        };
        Ok(PreparedVariant { text, timeseries })
    }

    async fn execute(&self, prepared: &PreparedVariant) -> BenchResult<u64> {
        match tokio::time::timeout(self.timeout, self.execute_once(prepared)).await {
            Ok(result) => result,
            Err(_) => Err(BenchError::QueryError(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn execute_once(&self, prepared: &PreparedVariant) -> BenchResult<u64> {
        let engine_error = |e: crate::engine::EngineError| BenchError::QueryError(e.to_string());
        match &prepared.timeseries {
            None => Ok(self.structural.query(&prepared.text).await.map_err(engine_error)? as u64),
            Some((ts_text, bindings)) => {
                let ids = self.structural.query_column(&prepared.text).await.map_err(engine_error)?;
                let mut bindings = bindings.clone();
                bindings.insert(POINT_IDS.to_string(), point_id_list(&ids));
                let text = substitute(ts_text, &bindings)?;
                let timeseries = self
                    .timeseries
                    .ok_or_else(|| BenchError::QueryError("hybrid query without a time-series store".to_string()))?;
                Ok(timeseries.query(&text).await.map_err(engine_error)? as u64)
            }
        }
    }
}
