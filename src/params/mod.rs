//! Parameter generator
//!
//! Mints the concrete bindings ("variants") each query runs with. Ids are
//! drawn from the loaded dataset and time windows slide across the series so
//! the variants of one query jointly cover it. Every variant is a pure
//! function of `(seed, query_id, variant index)` and the dataset.

pub mod catalog;

use std::collections::BTreeMap;

use chrono::DateTime;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bosbench_timeseries::derive_seed;

use crate::error::{BenchError, BenchResult};
use crate::export::{pivot, tabular, ExportLayout};
use crate::model::{Dialect, ExportFile, Node, NodeKind, Scale, Scenario, EPOCH_UNIX_SECONDS, STEP_SECONDS};

pub use catalog::{QuerySpec, WindowClass, CATALOG};

/// Node ids of the loaded dataset by kind, in id order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdPool {
    by_kind: BTreeMap<NodeKind, Vec<String>>,
}

impl IdPool {
    pub fn from_pairs<I>(pairs: I) -> BenchResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut pool = IdPool::default();
        for (id, kind) in pairs {
            let kind: NodeKind = kind.parse()?;
            pool.by_kind.entry(kind).or_default().push(id);
        }
        pool.sort();
        Ok(pool)
    }

    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut pool = IdPool::default();
        for n in nodes {
            pool.by_kind.entry(n.kind).or_default().push(n.id.clone());
        }
        pool.sort();
        pool
    }

    fn sort(&mut self) {
        for ids in self.by_kind.values_mut() {
            ids.sort();
        }
    }

    /// Read the ids from the scenario's node file, or from the pivot when the
    /// scenario has no node CSV.
    pub fn load(scenario: Scenario, layout: &ExportLayout) -> BenchResult<Self> {
        let csv = scenario
            .export_files()
            .iter()
            .copied()
            .find(|f| matches!(f, ExportFile::PgNodes | ExportFile::PgJsonbNodes | ExportFile::MgNodes));
        match csv {
            Some(file) => Self::from_pairs(tabular::read_node_kinds(&layout.file(file))?),
            None => Ok(Self::from_nodes(&pivot::read_nodes(&layout.nodes_parquet())?)),
        }
    }

    pub fn ids(&self, kind: NodeKind) -> &[String] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A half-open `[start, end)` window in Unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

fn day_string(seconds: i64) -> BenchResult<String> {
    DateTime::from_timestamp(seconds, 0)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .ok_or_else(|| BenchError::QueryError(format!("timestamp out of range: {}", seconds)))
}

fn rfc3339(seconds: i64) -> BenchResult<String> {
    tabular::format_rfc3339(seconds * 1_000_000).map_err(|e| BenchError::QueryError(e.to_string()))
}

impl TimeWindow {
    pub fn len_seconds(&self) -> i64 {
        self.end - self.start
    }

    /// `DATE_*` rendered for a dialect: RFC 3339 for SQL, Unix seconds for
    /// Cypher, `xsd:date` lexical form for SPARQL. `DAY_*` is the calendar
    /// day in every dialect.
    pub fn bindings(&self, dialect: Dialect) -> BenchResult<BTreeMap<String, String>> {
        let render = |t: i64| -> BenchResult<String> {
            match dialect {
                Dialect::Sql => rfc3339(t),
                Dialect::Cypher => Ok(t.to_string()),
                Dialect::Sparql => day_string(t),
            }
        };
        let mut out = BTreeMap::new();
        out.insert("DATE_START".to_string(), render(self.start)?);
        out.insert("DATE_END".to_string(), render(self.end)?);
        out.insert("DAY_START".to_string(), day_string(self.start)?);
        out.insert("DAY_END".to_string(), day_string(self.end)?);
        Ok(out)
    }
}

/// One concrete binding of a query's parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub query_id: String,
    pub index: usize,
    /// Placeholder name → raw node id
    pub ids: BTreeMap<String, String>,
    pub window: Option<TimeWindow>,
}

impl Variant {
    /// Placeholder bindings rendered for `dialect`
    pub fn bindings(&self, dialect: Dialect) -> BenchResult<BTreeMap<String, String>> {
        let mut out = self.ids.clone();
        if let Some(window) = &self.window {
            out.extend(window.bindings(dialect)?);
        }
        Ok(out)
    }
}

pub struct ParamGenerator {
    seed: u64,
    scale: Scale,
    variants: usize,
    pool: IdPool,
    /// `[t_min, t_max]` in Unix seconds
    range: Option<(i64, i64)>,
}

impl ParamGenerator {
    pub fn new(seed: u64, scale: Scale, variants: usize, pool: IdPool, range: Option<(i64, i64)>) -> Self {
        Self {
            seed,
            scale,
            variants,
            pool,
            range,
        }
    }

    /// Ids from the scenario's node file and the time range from the pivot
    /// statistics.
    pub fn for_scenario(
        scenario: Scenario,
        layout: &ExportLayout,
        seed: u64,
        scale: Scale,
        variants: usize,
    ) -> BenchResult<Self> {
        let pool = IdPool::load(scenario, layout)?;
        let range = pivot::time_range(&layout.timeseries_parquet())?
            .map(|(min, max)| (min.div_euclid(1_000_000), max.div_euclid(1_000_000)));
        debug!(scenario = %scenario, range = ?range, "Parameter generator ready");
        Ok(Self::new(seed, scale, variants, pool, range))
    }

    pub fn variant_count(&self) -> usize {
        self.variants
    }

    /// Window `index` of `class`: fixed length, start sliding from `t_min` to
    /// `t_max - length`, floored to the minute.
    pub fn window(&self, class: WindowClass, index: usize) -> TimeWindow {
        let (t_min, t_max) = self.range.unwrap_or((EPOCH_UNIX_SECONDS, EPOCH_UNIX_SECONDS));
        let span = (t_max - t_min).max(0);
        let size = class.seconds(self.scale).min(span);
        let slack = span - size;
        let offset = if self.variants > 1 {
            slack * index as i64 / (self.variants as i64 - 1)
        } else {
            0
        };
        let start = t_min + offset;
        let start = start - (start - EPOCH_UNIX_SECONDS).rem_euclid(STEP_SECONDS);
        TimeWindow {
            start,
            end: start + size,
        }
    }

    pub fn variants(&self, spec: &QuerySpec) -> BenchResult<Vec<Variant>> {
        (0..self.variants).map(|i| self.variant(spec, i)).collect()
    }

    pub fn variant(&self, spec: &QuerySpec, index: usize) -> BenchResult<Variant> {
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(self.seed, spec.id, index as u64));
        let mut ids = BTreeMap::new();
        for &kind in spec.ids {
            let candidates = self.pool.ids(kind);
            if candidates.is_empty() {
                return Err(BenchError::QueryError(format!(
                    "{} needs a {} id but the dataset has none",
                    spec.id, kind
                )));
            }
            let id = candidates[rng.gen_range(0..candidates.len())].clone();
            ids.insert(catalog::id_placeholder(kind), id);
        }
        Ok(Variant {
            query_id: spec.id.to_string(),
            index,
            ids,
            window: spec.window.map(|class| self.window(class, index)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400;

    fn pool() -> IdPool {
        IdPool::from_pairs(
            [
                ("building-0001", "Building"),
                ("building-0000", "Building"),
                ("point-0000000", "Point"),
                ("point-0000001", "Point"),
            ]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string())),
        )
        .unwrap()
    }

    fn week() -> Option<(i64, i64)> {
        Some((EPOCH_UNIX_SECONDS, EPOCH_UNIX_SECONDS + 7 * DAY - 60))
    }

    #[test]
    fn test_pool_sorts_ids() {
        let p = pool();
        assert_eq!(p.ids(NodeKind::Building), ["building-0000", "building-0001"]);
        assert!(p.ids(NodeKind::Tenant).is_empty());
        assert!(IdPool::from_pairs(vec![("x".to_string(), "Nope".to_string())]).is_err());
    }

    #[test]
    fn test_windows_slide_across_range() {
        let gen = ParamGenerator::new(42, Scale::Medium, 5, pool(), week());
        let first = gen.window(WindowClass::Analytics, 0);
        let last = gen.window(WindowClass::Analytics, 4);
        assert_eq!(first.start, EPOCH_UNIX_SECONDS);
        assert_eq!(first.len_seconds(), DAY);
        assert_eq!(last.len_seconds(), DAY);
        assert!(first.start < last.start);
        assert!(last.end <= EPOCH_UNIX_SECONDS + 7 * DAY);
        assert_eq!((last.start - EPOCH_UNIX_SECONDS) % 60, 0);
    }

    #[test]
    fn test_window_clamps_to_short_series() {
        let range = Some((EPOCH_UNIX_SECONDS, EPOCH_UNIX_SECONDS + 2 * DAY - 60));
        let gen = ParamGenerator::new(42, Scale::Large, 10, pool(), range);
        let w = gen.window(WindowClass::Trend, 9);
        assert_eq!(w.start, EPOCH_UNIX_SECONDS);
        assert_eq!(w.len_seconds(), 2 * DAY - 60);
    }

    #[test]
    fn test_variants_are_stable() {
        let spec = catalog::lookup("Q6").unwrap();
        let a = ParamGenerator::new(42, Scale::Small, 3, pool(), week()).variants(spec).unwrap();
        let b = ParamGenerator::new(42, Scale::Small, 3, pool(), week()).variants(spec).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a[0].ids.contains_key("BUILDING_ID"));
    }

    #[test]
    fn test_missing_kind_is_query_error() {
        let gen = ParamGenerator::new(42, Scale::Small, 3, pool(), week());
        let err = gen.variants(catalog::lookup("Q10").unwrap()).unwrap_err();
        assert!(matches!(err, BenchError::QueryError(_)));
    }

    #[test]
    fn test_dialect_rendering() {
        let w = TimeWindow {
            start: EPOCH_UNIX_SECONDS,
            end: EPOCH_UNIX_SECONDS + DAY,
        };
        let sql = w.bindings(Dialect::Sql).unwrap();
        assert_eq!(sql["DATE_START"], "2024-01-01T00:00:00Z");
        assert_eq!(sql["DAY_END"], "2024-01-02");
        let cypher = w.bindings(Dialect::Cypher).unwrap();
        assert_eq!(cypher["DATE_END"], (EPOCH_UNIX_SECONDS + DAY).to_string());
        let sparql = w.bindings(Dialect::Sparql).unwrap();
        assert_eq!(sparql["DATE_START"], "2024-01-01");
    }
}
