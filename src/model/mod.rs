//! Dataset model
//!
//! Typed node and relation kinds, the open property mapping, profile sizing
//! and the scenario catalogue. The structural graph is held as flat
//! `(nodes, edges)` vectors; no pointer graph is built.

pub mod edge;
pub mod node;
pub mod profile;
pub mod property;
pub mod scenario;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use edge::{Edge, Relation};
pub use node::{Node, NodeKind};
pub use profile::{Duration, Profile, ProfileCounts, Protocol, Scale, EPOCH_UNIX_SECONDS, STEPS_PER_DAY, STEP_SECONDS};
pub use property::{PropertyMap, PropertyValue};
pub use scenario::{Dialect, Engine, ExportFile, Scenario};

/// The structural graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Dataset {
    /// Sort into persistence order: nodes by id, edges by `(source, relation, target)`.
    pub fn sort(&mut self) {
        self.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.edges.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn node_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in &self.nodes {
            *counts.entry(node.kind.as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn edge_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.relation.as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// One telemetry sample with its denormalised building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub point_id: String,
    /// Microseconds since the Unix epoch, UTC
    pub time_micros: i64,
    pub value: f64,
    pub building_id: String,
}

/// Microseconds since the Unix epoch for a base step
pub fn step_to_micros(step: u32) -> i64 {
    (EPOCH_UNIX_SECONDS + step as i64 * STEP_SECONDS) * 1_000_000
}
