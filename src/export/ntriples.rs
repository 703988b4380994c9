//! N-Triples serialisation of the structural graph and of day chunks
//!
//! Entities live under `http://bosbench.org/id/`, classes and predicates
//! under `http://bosbench.org/ontology#`. Every file is written in lexical
//! line order.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use oxrdf::vocab::{rdf, xsd};
use oxrdf::{Literal, NamedNode, Term, Triple};
use rayon::slice::ParallelSliceMut;

use crate::error::{BenchError, BenchResult};
use crate::export::chunks::{for_each_chunk, Chunk};
use crate::model::{Edge, Node, PropertyValue};

pub const ENTITY_NAMESPACE: &str = "http://bosbench.org/id/";
pub const ONTOLOGY_NAMESPACE: &str = "http://bosbench.org/ontology#";

/// Prefix ↔ namespace table for the benchmark vocabulary
#[derive(Debug, Clone)]
pub struct NamespaceManager {
    prefixes: BTreeMap<String, String>,
}

impl NamespaceManager {
    pub fn new() -> Self {
        let mut mgr = Self {
            prefixes: BTreeMap::new(),
        };
        mgr.add_prefix("bos", ONTOLOGY_NAMESPACE);
        mgr.add_prefix("id", ENTITY_NAMESPACE);
        mgr.add_prefix("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
        mgr.add_prefix("xsd", "http://www.w3.org/2001/XMLSchema#");
        mgr
    }

    pub fn add_prefix(&mut self, prefix: impl Into<String>, iri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), iri.into());
    }

    pub fn get_iri(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(|s| s.as_str())
    }

    /// Expand `prefix:local` to a full IRI.
    pub fn expand(&self, compact_iri: &str) -> BenchResult<String> {
        let (prefix, local) = compact_iri
            .split_once(':')
            .ok_or_else(|| BenchError::Export(format!("not a compact IRI: {}", compact_iri)))?;
        let iri = self
            .get_iri(prefix)
            .ok_or_else(|| BenchError::Export(format!("unknown prefix: {}", prefix)))?;
        Ok(format!("{}{}", iri, local))
    }

    /// `PREFIX` declarations for every registered namespace, in prefix order
    pub fn sparql_prologue(&self) -> String {
        self.prefixes
            .iter()
            .map(|(prefix, iri)| format!("PREFIX {}: <{}>\n", prefix, iri))
            .collect()
    }

    fn named(&self, compact_iri: &str) -> BenchResult<NamedNode> {
        let iri = self.expand(compact_iri)?;
        NamedNode::new(iri).map_err(|e| BenchError::Export(format!("invalid IRI {}: {}", compact_iri, e)))
    }

    pub fn entity(&self, id: &str) -> BenchResult<NamedNode> {
        self.named(&format!("id:{}", id))
    }

    pub fn term(&self, name: &str) -> BenchResult<NamedNode> {
        self.named(&format!("bos:{}", name))
    }

    pub fn chunk(&self, chunk: &Chunk) -> BenchResult<NamedNode> {
        self.entity(&format!("{}/day/{}", chunk.point_id, chunk.day_string()))
    }
}

impl Default for NamespaceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn line(subject: &NamedNode, predicate: NamedNode, object: impl Into<Term>) -> String {
    format!("{} .", Triple::new(subject.clone(), predicate, object))
}

fn property_literal(value: &PropertyValue) -> Option<Literal> {
    match value {
        PropertyValue::String(s) => Some(Literal::new_simple_literal(s.as_str())),
        PropertyValue::Integer(i) => Some(Literal::new_typed_literal(i.to_string(), xsd::INTEGER)),
        PropertyValue::Float(f) => Some(Literal::new_typed_literal(f.to_string(), xsd::DOUBLE)),
        PropertyValue::Boolean(b) => Some(Literal::new_typed_literal(b.to_string(), xsd::BOOLEAN)),
        PropertyValue::Null => None,
    }
}

/// Triples describing one node. A point's `quantity` becomes `bos:MEASURES`.
pub fn node_triples(ns: &NamespaceManager, node: &Node) -> BenchResult<Vec<String>> {
    let subject = ns.entity(&node.id)?;
    let mut out = vec![
        line(&subject, rdf::TYPE.into_owned(), ns.term(node.kind.as_str())?),
        line(&subject, ns.term("name")?, Literal::new_simple_literal(node.name.as_str())),
    ];
    if let Some(building) = &node.building_id {
        out.push(line(&subject, ns.term("building_id")?, Literal::new_simple_literal(building.as_str())));
    }
    for (key, value) in &node.properties {
        let predicate = if key == "quantity" {
            ns.term("MEASURES")?
        } else {
            ns.term(key)?
        };
        if let Some(literal) = property_literal(value) {
            out.push(line(&subject, predicate, literal));
        }
    }
    Ok(out)
}

pub fn edge_triple(ns: &NamespaceManager, edge: &Edge) -> BenchResult<String> {
    Ok(line(
        &ns.entity(&edge.source_id)?,
        ns.term(edge.relation.as_str())?,
        ns.entity(&edge.target_id)?,
    ))
}

/// The chunk's own description plus the `HAS_TIMESERIES` link from its point.
pub fn chunk_triples(ns: &NamespaceManager, chunk: &Chunk) -> BenchResult<Vec<String>> {
    let subject = ns.chunk(chunk)?;
    Ok(vec![
        line(&subject, rdf::TYPE.into_owned(), ns.term("ArchiveDay")?),
        line(&subject, ns.term("point_id")?, Literal::new_simple_literal(chunk.point_id.as_str())),
        line(&subject, ns.term("day")?, Literal::new_typed_literal(chunk.day_string(), xsd::DATE)),
        line(
            &subject,
            ns.term("sample_count")?,
            Literal::new_typed_literal(chunk.len().to_string(), xsd::INTEGER),
        ),
        line(&subject, ns.term("timestamps")?, Literal::new_simple_literal(chunk.timestamps_json()?)),
        line(&subject, ns.term("values")?, Literal::new_simple_literal(chunk.values_json()?)),
        line(&ns.entity(&chunk.point_id)?, ns.term("HAS_TIMESERIES")?, subject),
    ])
}

fn write_lines(out: &mut impl Write, lines: &[String]) -> BenchResult<()> {
    for l in lines {
        out.write_all(l.as_bytes())?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Write `graph.nt`; returns the triple count.
pub fn write_graph_nt(path: &Path, nodes: &[Node], edges: &[Edge]) -> BenchResult<usize> {
    let ns = NamespaceManager::new();
    let mut lines = Vec::with_capacity(nodes.len() * 8 + edges.len());
    for node in nodes {
        lines.extend(node_triples(&ns, node)?);
    }
    for edge in edges {
        lines.push(edge_triple(&ns, edge)?);
    }
    lines.par_sort_unstable();
    lines.dedup();

    let mut out = BufWriter::new(File::create(path)?);
    write_lines(&mut out, &lines)?;
    out.flush()?;
    Ok(lines.len())
}

/// Write `chunks.nt` straight from the pivot; returns the triple count.
///
/// Every line of a point starts with `<…/id/point-NNNNNNN` followed by `/`
/// (its chunks) or `>` (its links), and ids are fixed width, so sorting each
/// point's lines and concatenating in point order yields a globally sorted
/// file without holding more than one point in memory.
pub fn write_chunks_nt(path: &Path, timeseries_parquet: &Path) -> BenchResult<usize> {
    let ns = NamespaceManager::new();
    let mut out = BufWriter::new(File::create(path)?);
    let mut pending: Vec<String> = Vec::new();
    let mut current_point: Option<String> = None;
    let mut total = 0;

    for_each_chunk(timeseries_parquet, |chunk| {
        if current_point.as_deref() != Some(chunk.point_id.as_str()) {
            pending.sort_unstable();
            write_lines(&mut out, &pending)?;
            total += pending.len();
            pending.clear();
            current_point = Some(chunk.point_id.clone());
        }
        pending.extend(chunk_triples(&ns, &chunk)?);
        Ok(())
    })?;
    pending.sort_unstable();
    write_lines(&mut out, &pending)?;
    total += pending.len();

    out.flush()?;
    Ok(total)
}
