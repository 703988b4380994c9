//! Typed relations between dataset nodes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::node::NodeKind;
use crate::error::BenchError;

/// Relation kind of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relation {
    Contains,
    LocatedIn,
    HasPart,
    HasPoint,
    Measures,
    Controls,
    Feeds,
    Serves,
    Occupies,
}

impl Relation {
    pub const ALL: [Relation; 9] = [
        Relation::Contains,
        Relation::LocatedIn,
        Relation::HasPart,
        Relation::HasPoint,
        Relation::Measures,
        Relation::Controls,
        Relation::Feeds,
        Relation::Serves,
        Relation::Occupies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Contains => "CONTAINS",
            Relation::LocatedIn => "LOCATED_IN",
            Relation::HasPart => "HAS_PART",
            Relation::HasPoint => "HAS_POINT",
            Relation::Measures => "MEASURES",
            Relation::Controls => "CONTROLS",
            Relation::Feeds => "FEEDS",
            Relation::Serves => "SERVES",
            Relation::Occupies => "OCCUPIES",
        }
    }

    /// Typed schema of the structural graph.
    ///
    /// `MEASURES` points at a quantity literal rather than a node, so no node
    /// pair admits it.
    pub fn allows(&self, source: NodeKind, target: NodeKind) -> bool {
        use NodeKind::*;
        match self {
            Relation::Contains => matches!(
                (source, target),
                (Site, Building) | (Building, Floor) | (Floor, Space)
            ),
            Relation::LocatedIn => source == Equipment && target == Space,
            Relation::HasPart => source == Equipment && target == Equipment,
            Relation::HasPoint => source == Equipment && target == Point,
            Relation::Controls => source == Point && target == Equipment,
            Relation::Feeds => source == Meter && matches!(target, Meter | Equipment),
            Relation::Serves => source == Equipment && target == Space,
            Relation::Occupies => source == Tenant && target == Space,
            Relation::Measures => false,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Relation {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BenchError::Config(format!("unknown relation: {}", s)))
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub relation: Relation,
}

impl Edge {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, relation: Relation) -> Self {
        Edge {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation,
        }
    }

    /// Persistence order: `(source_id, relation, target_id)`
    pub fn sort_key(&self) -> (&str, &'static str, &str) {
        (&self.source_id, self.relation.as_str(), &self.target_id)
    }
}
