//! Query library
//!
//! One UTF-8 file per query under `queries/<scenario>/<Qnn>_<name>.<ext>`.
//! Hybrid files hold a graph part and a time-series part separated by a line
//! reading `---- timeseries ----`. Texts are not parsed beyond placeholder
//! substitution.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{BenchError, BenchResult};
use crate::model::{Dialect, Scenario};

pub const HYBRID_SEPARATOR: &str = "---- timeseries ----";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Z][A-Z0-9_]*)").unwrap_or_else(|_| unreachable!()))
}

/// Names of every `$PLACEHOLDER` in a text
pub fn placeholders(text: &str) -> BTreeSet<String> {
    placeholder_regex()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Replace each `$NAME` with its binding. Every placeholder must be bound.
pub fn substitute(text: &str, bindings: &BTreeMap<String, String>) -> BenchResult<String> {
    let mut missing = BTreeSet::new();
    let out = placeholder_regex().replace_all(text, |c: &Captures| match bindings.get(&c[1]) {
        Some(v) => v.clone(),
        None => {
            missing.insert(c[1].to_string());
            c[0].to_string()
        }
    });
    if missing.is_empty() {
        Ok(out.into_owned())
    } else {
        let names: Vec<String> = missing.into_iter().collect();
        Err(BenchError::QueryError(format!("unbound placeholders: {}", names.join(", "))))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryTemplate {
    /// `Q1` … `Q13`
    pub id: String,
    pub name: String,
    pub dialect: Dialect,
    /// Whole text, or the graph part of a hybrid query
    pub text: String,
    /// Time-series part of a hybrid query (SQL)
    pub timeseries_text: Option<String>,
}

impl QueryTemplate {
    pub fn is_hybrid(&self) -> bool {
        self.timeseries_text.is_some()
    }

    /// Numeric part of the id, for ordering
    pub fn number(&self) -> u32 {
        self.id.trim_start_matches('Q').parse().unwrap_or(u32::MAX)
    }

    /// Parse a file name and body.
    pub fn parse(file_name: &str, body: &str, dialect: Dialect) -> BenchResult<Self> {
        let stem = file_name
            .strip_suffix(&format!(".{}", dialect.extension()))
            .ok_or_else(|| BenchError::Config(format!("{} is not a .{} file", file_name, dialect.extension())))?;
        let (id, name) = stem
            .split_once('_')
            .ok_or_else(|| BenchError::Config(format!("query file {} is not <id>_<name>", file_name)))?;
        if !id.starts_with('Q') || id[1..].parse::<u32>().is_err() {
            return Err(BenchError::Config(format!("query file {} has no Q<n> id", file_name)));
        }

        let mut graph_part = Vec::new();
        let mut ts_part: Option<Vec<&str>> = None;
        for line in body.lines() {
            if line.trim() == HYBRID_SEPARATOR {
                ts_part = Some(Vec::new());
                continue;
            }
            match ts_part.as_mut() {
                Some(ts) => ts.push(line),
                None => graph_part.push(line),
            }
        }
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            dialect,
            text: graph_part.join("\n").trim().to_string(),
            timeseries_text: ts_part.map(|ts| ts.join("\n").trim().to_string()),
        })
    }

    /// Placeholders the parameter generator has to bind (`$POINT_IDS` is
    /// bound at execution time from the graph part).
    pub fn parameters(&self) -> BTreeSet<String> {
        let mut names = placeholders(&self.text);
        if let Some(ts) = &self.timeseries_text {
            names.extend(placeholders(ts));
        }
        names.remove(POINT_IDS);
        names
    }
}

/// Placeholder carrying the graph part's result into the time-series part
pub const POINT_IDS: &str = "POINT_IDS";

#[derive(Debug, Clone, Default)]
pub struct QueryLibrary {
    pub queries: Vec<QueryTemplate>,
}

impl QueryLibrary {
    /// Load every query of a scenario in id order.
    pub fn load(root: &Path, scenario: Scenario) -> BenchResult<Self> {
        let dir = root.join(scenario.query_dir());
        let dialect = scenario.dialect();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| BenchError::Config(format!("query directory {}: {}", dir.display(), e)))?;

        let mut queries = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) != Some(dialect.extension()) {
                continue;
            }
            let body = std::fs::read_to_string(&path)?;
            let template = QueryTemplate::parse(file_name, &body, dialect)?;
            if template.is_hybrid() != scenario.is_hybrid() && template.is_hybrid() {
                return Err(BenchError::Config(format!(
                    "{} is hybrid but {} has no time-series store",
                    file_name, scenario
                )));
            }
            queries.push(template);
        }
        queries.sort_by_key(|q| q.number());
        debug!(scenario = %scenario, queries = queries.len(), "Loaded query library");
        Ok(Self { queries })
    }

    pub fn get(&self, id: &str) -> Option<&QueryTemplate> {
        self.queries.iter().find(|q| q.id == id)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_substitute_longest_token() {
        let text = "WHERE time >= '$DATE_START' AND time < '$DATE_END' AND b = '$BUILDING_ID'";
        let out = substitute(
            text,
            &bindings(&[
                ("DATE_START", "2024-01-01T00:00:00Z"),
                ("DATE_END", "2024-01-02T00:00:00Z"),
                ("BUILDING_ID", "building-0001"),
            ]),
        )
        .unwrap();
        assert_eq!(
            out,
            "WHERE time >= '2024-01-01T00:00:00Z' AND time < '2024-01-02T00:00:00Z' AND b = 'building-0001'"
        );
    }

    #[test]
    fn test_unbound_placeholder_is_query_error() {
        let err = substitute("id = '$SPACE_ID'", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BenchError::QueryError(_)));
        assert!(err.to_string().contains("SPACE_ID"));
    }

    #[test]
    fn test_parse_hybrid_file() {
        let body = "MATCH (p:Point) RETURN p.id AS point_id\n---- timeseries ----\nSELECT avg(value) FROM timeseries WHERE point_id IN ($POINT_IDS) AND time >= '$DATE_START'\n";
        let q = QueryTemplate::parse("Q7_floor_temperature.cypher", body, Dialect::Cypher).unwrap();
        assert_eq!(q.id, "Q7");
        assert_eq!(q.name, "floor_temperature");
        assert_eq!(q.text, "MATCH (p:Point) RETURN p.id AS point_id");
        assert!(q.timeseries_text.as_deref().unwrap().starts_with("SELECT avg(value)"));
        assert_eq!(q.parameters(), ["DATE_START".to_string()].into_iter().collect());
        assert_eq!(q.number(), 7);
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert!(QueryTemplate::parse("building.sql", "SELECT 1", Dialect::Sql).is_err());
        assert!(QueryTemplate::parse("X1_foo.sql", "SELECT 1", Dialect::Sql).is_err());
        assert!(QueryTemplate::parse("Q1_foo.cypher", "RETURN 1", Dialect::Sql).is_err());
    }

    #[test]
    fn test_load_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("p1");
        std::fs::create_dir_all(&p1).unwrap();
        for name in ["Q10_b.sql", "Q2_a.sql", "Q1_c.sql", "README.md"] {
            std::fs::write(p1.join(name), "SELECT 1").unwrap();
        }
        let lib = QueryLibrary::load(dir.path(), Scenario::P1).unwrap();
        let ids: Vec<&str> = lib.queries.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["Q1", "Q2", "Q10"]);
        assert!(lib.get("Q2").is_some());
    }
}
