//! Storage scenarios under test
//!
//! | Scenario | Engines | Structure | Time-series |
//! |---|---|---|---|
//! | P1 | relational | typed columns | hypertable |
//! | P2 | relational | JSONB properties | hypertable |
//! | M1 | graph | property graph | daily chunks in the graph |
//! | M2 | graph + relational | property graph | hypertable (hybrid) |
//! | O1 | RDF | triples | daily chunks as triples |
//! | O2 | RDF + relational | triples | hypertable (hybrid) |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BenchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scenario {
    P1,
    P2,
    M1,
    M2,
    O1,
    O2,
}

/// Engine family a container provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Relational,
    Graph,
    Rdf,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Relational => "relational",
            Engine::Graph => "graph",
            Engine::Rdf => "rdf",
        }
    }
}

/// Query language of a query file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sql,
    Cypher,
    Sparql,
}

impl Dialect {
    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Sql => "sql",
            Dialect::Cypher => "cypher",
            Dialect::Sparql => "sparql",
        }
    }

    pub fn engine(&self) -> Engine {
        match self {
            Dialect::Sql => Engine::Relational,
            Dialect::Cypher => Engine::Graph,
            Dialect::Sparql => Engine::Rdf,
        }
    }
}

/// Files the exporter can produce for scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFile {
    PgNodes,
    PgJsonbNodes,
    PgEdges,
    MgNodes,
    MgEdges,
    MgChunks,
    GraphNt,
    ChunksNt,
    TimeseriesCsv,
}

impl ExportFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFile::PgNodes => "pg_nodes.csv",
            ExportFile::PgJsonbNodes => "pg_jsonb_nodes.csv",
            ExportFile::PgEdges => "pg_edges.csv",
            ExportFile::MgNodes => "mg_nodes.csv",
            ExportFile::MgEdges => "mg_edges.csv",
            ExportFile::MgChunks => "mg_chunks.csv",
            ExportFile::GraphNt => "graph.nt",
            ExportFile::ChunksNt => "chunks.nt",
            ExportFile::TimeseriesCsv => "timeseries.csv",
        }
    }
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::P1,
        Scenario::P2,
        Scenario::M1,
        Scenario::M2,
        Scenario::O1,
        Scenario::O2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::P1 => "P1",
            Scenario::P2 => "P2",
            Scenario::M1 => "M1",
            Scenario::M2 => "M2",
            Scenario::O1 => "O1",
            Scenario::O2 => "O2",
        }
    }

    /// Engines that must be running, structural engine first
    pub fn engines(&self) -> Vec<Engine> {
        match self {
            Scenario::P1 | Scenario::P2 => vec![Engine::Relational],
            Scenario::M1 => vec![Engine::Graph],
            Scenario::M2 => vec![Engine::Graph, Engine::Relational],
            Scenario::O1 => vec![Engine::Rdf],
            Scenario::O2 => vec![Engine::Rdf, Engine::Relational],
        }
    }

    pub fn export_files(&self) -> &'static [ExportFile] {
        use ExportFile::*;
        match self {
            Scenario::P1 => &[PgNodes, PgEdges, TimeseriesCsv],
            Scenario::P2 => &[PgJsonbNodes, PgEdges, TimeseriesCsv],
            Scenario::M1 => &[MgNodes, MgEdges, MgChunks],
            Scenario::M2 => &[MgNodes, MgEdges, TimeseriesCsv],
            Scenario::O1 => &[GraphNt, ChunksNt],
            Scenario::O2 => &[GraphNt, TimeseriesCsv],
        }
    }

    /// Whether time-series live in the shared columnar store
    pub fn uses_shared_timeseries(&self) -> bool {
        self.export_files().contains(&ExportFile::TimeseriesCsv)
    }

    /// Graph selection followed by a time-series aggregation
    pub fn is_hybrid(&self) -> bool {
        matches!(self, Scenario::M2 | Scenario::O2)
    }

    /// Dialect of the structural engine
    pub fn dialect(&self) -> Dialect {
        match self {
            Scenario::P1 | Scenario::P2 => Dialect::Sql,
            Scenario::M1 | Scenario::M2 => Dialect::Cypher,
            Scenario::O1 | Scenario::O2 => Dialect::Sparql,
        }
    }

    /// Dialect of the time-series part of hybrid queries
    pub fn timeseries_dialect(&self) -> Option<Dialect> {
        if self.is_hybrid() {
            Some(Dialect::Sql)
        } else {
            None
        }
    }

    /// Directory name under the query library root
    pub fn query_dir(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    /// Parse `P1`, `p1,m2` or `all`.
    pub fn parse_list(s: &str) -> Result<Vec<Scenario>, BenchError> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Scenario::ALL.to_vec());
        }
        let mut out = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let scenario: Scenario = part.parse()?;
            if !out.contains(&scenario) {
                out.push(scenario);
            }
        }
        if out.is_empty() {
            return Err(BenchError::Config("no scenario given".to_string()));
        }
        Ok(out)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BenchError::Config(format!("unknown scenario: {}", s)))
    }
}
