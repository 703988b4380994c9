//! Engine clients
//!
//! One client per engine family behind the [`EngineClient`] trait: Postgres
//! (TimescaleDB) over sqlx, Memgraph over Bolt, Oxigraph over SPARQL HTTP.
//! Every query text runs as-is; nothing is prepared or cached client-side.

pub mod bolt;
pub mod postgres;
pub mod sparql;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::model::{Engine, Scenario};

pub use bolt::BoltClient;
pub use postgres::PostgresClient;
pub use sparql::SparqlClient;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine rejected a statement
    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The engine answered with something the client cannot interpret
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Bolt error: {0}")]
    Bolt(#[from] neo4rs::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Uniform query surface over the three engine families.
#[async_trait]
pub trait EngineClient: Send + Sync {
    fn engine(&self) -> Engine;

    /// Run a read query and return its row count
    async fn query(&self, text: &str) -> EngineResult<usize>;

    /// Run a read query and return its first column as strings
    async fn query_column(&self, text: &str) -> EngineResult<Vec<String>>;

    /// Run a statement whose result is not needed
    async fn execute(&self, text: &str) -> EngineResult<()>;

    /// Cheapest round trip the engine supports
    async fn ping(&self) -> EngineResult<()>;
}

/// Open connections for one run
#[derive(Default)]
pub struct Connections {
    pub relational: Option<PostgresClient>,
    pub graph: Option<BoltClient>,
    pub rdf: Option<SparqlClient>,
}

impl Connections {
    /// Connect to every engine the scenario uses.
    pub async fn open(scenario: Scenario, config: &EngineConfig) -> EngineResult<Self> {
        let mut conns = Connections::default();
        for engine in scenario.engines() {
            match engine {
                Engine::Relational => {
                    conns.relational = Some(PostgresClient::connect(&config.postgres_url()).await?)
                }
                Engine::Graph => conns.graph = Some(BoltClient::connect(&config.bolt_uri()).await?),
                Engine::Rdf => conns.rdf = Some(SparqlClient::new(&config.sparql_base_url())),
            }
        }
        Ok(conns)
    }

    pub fn client(&self, engine: Engine) -> Option<&dyn EngineClient> {
        match engine {
            Engine::Relational => self.relational.as_ref().map(|c| c as &dyn EngineClient),
            Engine::Graph => self.graph.as_ref().map(|c| c as &dyn EngineClient),
            Engine::Rdf => self.rdf.as_ref().map(|c| c as &dyn EngineClient),
        }
    }

    pub fn require(&self, engine: Engine) -> EngineResult<&dyn EngineClient> {
        self.client(engine)
            .ok_or_else(|| EngineError::ConnectionError(format!("no {} connection open", engine.as_str())))
    }

    pub async fn close(self) {
        if let Some(pg) = self.relational {
            pg.close().await;
        }
    }
}

/// Quote a string as a Cypher or SPARQL single-quoted literal.
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
