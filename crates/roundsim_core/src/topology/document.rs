//! Persisted graph format.
//!
//! ```json
//! {"graph": {"nofVertices": 3, "edges": [{"edge": [0, 1], "reliability": 0.1}]}}
//! ```
//!
//! Each undirected edge appears once.

use serde::{Deserialize, Serialize};

use super::Topology;
use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub graph: GraphBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphBody {
    #[serde(rename = "nofVertices")]
    pub nof_vertices: usize,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub edge: [usize; 2],
    pub reliability: f64,
}

impl GraphDocument {
    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Topology {
    /// Build a topology from a decoded graph document.
    pub fn from_document(doc: &GraphDocument) -> SimResult<Self> {
        let n = doc.graph.nof_vertices;
        let mut topology = Topology::new(n);
        for record in &doc.graph.edges {
            let [v, w] = record.edge;
            if v >= n || w >= n {
                return Err(SimError::Parse(format!(
                    "edge [{v}, {w}] references a vertex outside [0, {n})"
                )));
            }
            if !(0.0..=1.0).contains(&record.reliability) {
                return Err(SimError::Parse(format!(
                    "edge [{v}, {w}] has reliability {} outside [0, 1]",
                    record.reliability
                )));
            }
            topology.insert_edge(v, w, record.reliability)?;
        }
        Ok(topology)
    }

    /// Snapshot of the currently present edges.
    pub fn to_document(&self) -> GraphDocument {
        let edges = self
            .current_edges()
            .into_iter()
            .map(|(v, w)| EdgeRecord {
                edge: [v, w],
                reliability: self.reliability(v, w),
            })
            .collect();
        GraphDocument {
            graph: GraphBody {
                nof_vertices: self.order(),
                edges,
            },
        }
    }
}
