//! Graph ingestion interface.
//!
//! A [`GraphSink`] accepts typed node and edge records, checks them against
//! the schema configuration, and persists them somewhere. The driver sends
//! every node before the first edge.

use crate::models::{Edge, Node};
use crate::schema::SchemaMapping;
use anyhow::Result;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SinkSummary {
    pub nodes_written: u64,
    pub edges_written: u64,
    pub duplicates_dropped: u64,
}

pub trait GraphSink {
    fn write_node(&mut self, node: &Node) -> Result<()>;

    fn write_edge(&mut self, edge: &Edge) -> Result<()>;

    /// Flushes anything buffered. Called exactly once, after the last record.
    fn finish(&mut self) -> Result<SinkSummary>;
}

/// Tracks ids already written. The first record with a given id wins; later
/// ones are dropped with a warning.
#[derive(Default)]
pub struct FirstSeen {
    nodes: FxHashSet<String>,
    edges: FxHashSet<String>,
    dropped: u64,
}

impl FirstSeen {
    pub fn admit_node(&mut self, node: &Node) -> bool {
        if self.nodes.insert(node.id.clone()) {
            return true;
        }
        warn!(id = %node.id, label = %node.label, "Dropping duplicate node");
        self.dropped += 1;
        false
    }

    pub fn admit_edge(&mut self, edge: &Edge) -> bool {
        if self.edges.insert(edge.id.clone()) {
            return true;
        }
        warn!(id = %edge.id, label = %edge.label, "Dropping duplicate edge");
        self.dropped += 1;
        false
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Validates and counts without writing anything
pub struct DryRunSink {
    schema: SchemaMapping,
    seen: FirstSeen,
    summary: SinkSummary,
}

impl DryRunSink {
    pub fn new(schema: SchemaMapping) -> Self {
        Self {
            schema,
            seen: FirstSeen::default(),
            summary: SinkSummary::default(),
        }
    }
}

impl GraphSink for DryRunSink {
    fn write_node(&mut self, node: &Node) -> Result<()> {
        self.schema.resolve_node(node)?;
        if self.seen.admit_node(node) {
            self.summary.nodes_written += 1;
        }
        Ok(())
    }

    fn write_edge(&mut self, edge: &Edge) -> Result<()> {
        self.schema.resolve_edge(edge)?;
        if self.seen.admit_edge(edge) {
            self.summary.edges_written += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<SinkSummary> {
        self.summary.duplicates_dropped = self.seen.dropped();
        Ok(self.summary.clone())
    }
}
