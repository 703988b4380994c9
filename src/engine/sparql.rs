//! Oxigraph client over the SPARQL 1.1 protocol
//!
//! Queries are POSTed as `application/sparql-query` to `/query`; bulk data
//! is POSTed as N-Triples to `/store?default`, which appends to the default
//! graph.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;

use super::{EngineClient, EngineError, EngineResult};
use crate::model::Engine;

const RESULTS_JSON: &str = "application/sparql-results+json";

#[derive(Debug, Deserialize)]
struct SparqlResults {
    head: SparqlHead,
    #[serde(default)]
    results: Option<SparqlBindings>,
    #[serde(default)]
    boolean: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SparqlHead {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SparqlBindings {
    bindings: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl SparqlResults {
    fn rows(&self) -> usize {
        match (&self.results, self.boolean) {
            (Some(r), _) => r.bindings.len(),
            (None, Some(_)) => 1,
            (None, None) => 0,
        }
    }

    /// Lexical values of the first projected variable; unbound cells are skipped
    fn first_column(&self) -> Vec<String> {
        let (Some(var), Some(results)) = (self.head.vars.first(), &self.results) else {
            return Vec::new();
        };
        results
            .bindings
            .iter()
            .filter_map(|b| b.get(var))
            .filter_map(|term| term.get("value").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .collect()
    }
}

pub struct SparqlClient {
    base_url: String,
    http_client: Client,
}

impl SparqlClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: Client::new(),
        }
    }

    async fn select(&self, text: &str) -> EngineResult<SparqlResults> {
        let url = format!("{}/query", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/sparql-query")
            .header(ACCEPT, RESULTS_JSON)
            .body(text.to_string())
            .send()
            .await?;

        if response.status().is_success() {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let status = response.status();
            let msg = response.text().await.unwrap_or_default();
            Err(EngineError::QueryError(format!("{}: {}", status, msg.trim())))
        }
    }

    /// Append N-Triples to the default graph.
    pub async fn load_ntriples(&self, data: Vec<u8>) -> EngineResult<()> {
        let url = format!("{}/store?default", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/n-triples")
            .body(data)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let msg = response.text().await.unwrap_or_default();
            Err(EngineError::QueryError(format!("bulk load rejected ({}): {}", status, msg.trim())))
        }
    }

    /// Result of a single-row `SELECT (COUNT(...) AS ?n)` query
    pub async fn count(&self, text: &str) -> EngineResult<u64> {
        let results = self.select(text).await?;
        let value = results
            .first_column()
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::ProtocolError("count query returned no binding".to_string()))?;
        value
            .parse()
            .map_err(|_| EngineError::ProtocolError(format!("count is not an integer: {}", value)))
    }
}

#[async_trait]
impl EngineClient for SparqlClient {
    fn engine(&self) -> Engine {
        Engine::Rdf
    }

    async fn query(&self, text: &str) -> EngineResult<usize> {
        Ok(self.select(text).await?.rows())
    }

    async fn query_column(&self, text: &str) -> EngineResult<Vec<String>> {
        Ok(self.select(text).await?.first_column())
    }

    async fn execute(&self, text: &str) -> EngineResult<()> {
        let url = format!("{}/update", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header(CONTENT_TYPE, "application/sparql-update")
            .body(text.to_string())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EngineError::QueryError(format!("update returned {}", response.status())))
        }
    }

    async fn ping(&self) -> EngineResult<()> {
        self.select("ASK { }").await.map(|_| ())
    }
}
