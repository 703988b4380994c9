//! Memgraph client over Bolt (no auth)

use async_trait::async_trait;
use neo4rs::{query, Graph};

use super::{EngineClient, EngineError, EngineResult};
use crate::model::Engine;

/// Column hybrid graph parts return their point ids under
pub const POINT_ID_COLUMN: &str = "point_id";

pub struct BoltClient {
    graph: Graph,
}

impl BoltClient {
    pub async fn connect(uri: &str) -> EngineResult<Self> {
        let graph = Graph::new(uri, "", "").await?;
        Ok(Self { graph })
    }

    /// Run a single aggregate query and read one integer column.
    pub async fn scalar_i64(&self, text: &str, column: &str) -> EngineResult<i64> {
        let mut stream = self.graph.execute(query(text)).await?;
        let row = stream
            .next()
            .await?
            .ok_or_else(|| EngineError::ProtocolError("aggregate returned no row".to_string()))?;
        row.get::<i64>(column)
            .map_err(|e| EngineError::ProtocolError(format!("column {}: {}", column, e)))
    }
}

#[async_trait]
impl EngineClient for BoltClient {
    fn engine(&self) -> Engine {
        Engine::Graph
    }

    async fn query(&self, text: &str) -> EngineResult<usize> {
        let mut stream = self.graph.execute(query(text)).await?;
        let mut rows = 0;
        while stream.next().await?.is_some() {
            rows += 1;
        }
        Ok(rows)
    }

    /// Reads the `point_id` column, the convention for graph parts that
    /// feed a time-series query.
    async fn query_column(&self, text: &str) -> EngineResult<Vec<String>> {
        let mut stream = self.graph.execute(query(text)).await?;
        let mut out = Vec::new();
        while let Some(row) = stream.next().await? {
            let id = row
                .get::<String>(POINT_ID_COLUMN)
                .map_err(|e| EngineError::ProtocolError(format!("column {}: {}", POINT_ID_COLUMN, e)))?;
            out.push(id);
        }
        Ok(out)
    }

    async fn execute(&self, text: &str) -> EngineResult<()> {
        self.graph.run(query(text)).await?;
        Ok(())
    }

    async fn ping(&self) -> EngineResult<()> {
        self.query("RETURN 1 AS one").await.map(|_| ())
    }
}
