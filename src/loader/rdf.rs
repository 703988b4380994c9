//! RDF loader (O1, O2)
//!
//! N-Triples files are POSTed to the store's bulk endpoint in line-aligned
//! slices, each under the batch timeout, then the triple, entity and
//! relationship counts are checked against what was exported.

use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use super::{check_count, timed, LoadReport};
use crate::config::TimeoutConfig;
use crate::engine::SparqlClient;
use crate::error::BenchResult;
use crate::export::ntriples::NamespaceManager;
use crate::export::{ExportLayout, Manifest};
use crate::model::{ExportFile, Relation, Scenario};

/// Upper bound of one POST body
pub const SLICE_BYTES: usize = 32 * 1024 * 1024;

/// Reads a line-oriented file in slices of at most `max_bytes`; a single
/// longer line still forms its own slice.
pub struct SliceReader {
    reader: BufReader<std::fs::File>,
    max_bytes: usize,
    carry: Vec<u8>,
}

impl SliceReader {
    pub fn open(path: &Path, max_bytes: usize) -> BenchResult<Self> {
        Ok(Self {
            reader: BufReader::new(std::fs::File::open(path)?),
            max_bytes,
            carry: Vec::new(),
        })
    }

    /// Next `(payload, line count)`, or `None` at end of file
    pub fn next_slice(&mut self) -> BenchResult<Option<(Vec<u8>, u64)>> {
        let mut current = std::mem::take(&mut self.carry);
        let mut lines = if current.is_empty() { 0 } else { 1 };
        let mut line = Vec::new();
        loop {
            line.clear();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            if !current.is_empty() && current.len() + line.len() > self.max_bytes {
                self.carry = line;
                return Ok(Some((current, lines)));
            }
            current.extend_from_slice(&line);
            lines += 1;
        }
        Ok((!current.is_empty()).then_some((current, lines)))
    }
}

/// Counts entity-to-entity relationship triples. `bos:MEASURES` also carries
/// a point's quantity literal, hence the IRI filter.
pub fn relationship_count_query(ns: &NamespaceManager) -> String {
    let predicates: Vec<String> = Relation::ALL.iter().map(|r| format!("bos:{}", r.as_str())).collect();
    format!(
        "{}SELECT (COUNT(*) AS ?n) WHERE {{ VALUES ?p {{ {} }} ?s ?p ?o . FILTER(isIRI(?o)) }}",
        ns.sparql_prologue(),
        predicates.join(" ")
    )
}

pub struct RdfLoader<'a> {
    client: &'a SparqlClient,
    layout: &'a ExportLayout,
    manifest: &'a Manifest,
    timeouts: &'a TimeoutConfig,
}

impl<'a> RdfLoader<'a> {
    pub fn new(
        client: &'a SparqlClient,
        layout: &'a ExportLayout,
        manifest: &'a Manifest,
        timeouts: &'a TimeoutConfig,
    ) -> Self {
        Self {
            client,
            layout,
            manifest,
            timeouts,
        }
    }

    pub async fn load(&self, scenario: Scenario) -> BenchResult<LoadReport> {
        let mut report = LoadReport::default();
        report.triples += self.post_file(ExportFile::GraphNt, &mut report).await?;
        let ns = NamespaceManager::new();
        if scenario.export_files().contains(&ExportFile::ChunksNt) {
            report.triples += self.post_file(ExportFile::ChunksNt, &mut report).await?;
            let chunks_query = format!(
                "{}SELECT (COUNT(?c) AS ?n) WHERE {{ ?c rdf:type bos:ArchiveDay }}",
                ns.sparql_prologue()
            );
            report.chunks = timed(self.timeouts.statement, "count", self.client.count(&chunks_query)).await?;
        }

        let stored = timed(
            self.timeouts.statement,
            "count",
            self.client.count("SELECT (COUNT(*) AS ?n) WHERE { ?s ?p ?o }"),
        )
        .await?;
        check_count("triples", report.triples, stored)?;

        let entities_query = format!(
            "{}SELECT (COUNT(DISTINCT ?s) AS ?n) WHERE {{ ?s rdf:type ?k . FILTER(?k != bos:ArchiveDay) }}",
            ns.sparql_prologue()
        );
        report.entities = timed(self.timeouts.statement, "count", self.client.count(&entities_query)).await?;
        check_count("entities", self.manifest.node_total() as u64, report.entities)?;
        report.nodes = report.entities;
        report.edges = timed(
            self.timeouts.statement,
            "count",
            self.client.count(&relationship_count_query(&ns)),
        )
        .await?;
        check_count("relationships", self.manifest.edge_total() as u64, report.edges)?;

        info!(
            triples = report.triples,
            entities = report.entities,
            edges = report.edges,
            "RDF load complete"
        );
        Ok(report)
    }

    async fn post_file(&self, file: ExportFile, report: &mut LoadReport) -> BenchResult<u64> {
        let path = self.layout.file(file);
        let mut slices = SliceReader::open(&path, SLICE_BYTES)?;
        let mut total = 0;
        while let Some((payload, lines)) = slices.next_slice()? {
            let bytes = payload.len();
            timed(self.timeouts.batch, file.file_name(), self.client.load_ntriples(payload)).await?;
            report.batches += 1;
            total += lines;
            debug!(file = file.file_name(), bytes, lines, "Posted N-Triples slice");
        }
        info!(file = file.file_name(), triples = total, "N-Triples loaded");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_slices(path: &Path, max_bytes: usize) -> Vec<(Vec<u8>, u64)> {
        let mut reader = SliceReader::open(path, max_bytes).unwrap();
        let mut out = Vec::new();
        while let Some(slice) = reader.next_slice().unwrap() {
            out.push(slice);
        }
        out
    }

    #[test]
    fn test_slices_respect_line_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.nt");
        std::fs::write(&path, "<a> <b> <c> .\n<d> <e> <f> .\n<g> <h> <i> .\n").unwrap();

        let slices = read_slices(&path, 30);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].1, 2);
        assert_eq!(slices[1].0, b"<g> <h> <i> .\n".to_vec());
        assert_eq!(slices.iter().map(|s| s.1).sum::<u64>(), 3);

        let single = read_slices(&path, 4);
        assert_eq!(single.len(), 3);
    }

    #[test]
    fn test_relationship_count_covers_every_relation() {
        let query = relationship_count_query(&NamespaceManager::new());
        assert!(query.starts_with("PREFIX"));
        for rel in Relation::ALL {
            assert!(query.contains(&format!("bos:{} ", rel.as_str())), "{}", rel.as_str());
        }
        assert!(query.contains("FILTER(isIRI(?o))"));
        assert!(query.contains("COUNT(*) AS ?n"));
    }

    #[test]
    fn test_empty_file_has_no_slices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.nt");
        std::fs::write(&path, "").unwrap();
        assert!(read_slices(&path, 1024).is_empty());
    }
}
