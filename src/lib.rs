//! sysbio-kg: SBGN-ML to knowledge graph pipeline
//!
//! Reads a Systems Biology Graphical Notation (SBGN-ML) map and loads it into a
//! property graph:
//!
//! 1. **Indexing Pass** -- Stream the document once to collect glyph ids and
//!    port-to-glyph mappings. A malformed document fails here, before any
//!    record is produced
//! 2. **Node Pass** -- Stream again and turn every top-level glyph into a node
//! 3. **Edge Pass** -- Stream a third time and turn every arc into an edge,
//!    resolving port references to their owning glyph
//! 4. **Ingestion** -- Check each record against the schema configuration and
//!    hand it to a sink: dry run, neo4j-admin CSV export, or Bolt `MERGE`s
//!
//! # Key Modules
//!
//! - [`parser`] -- Streaming SBGN-ML reader with BZ2 decompression
//! - [`index`] -- Glyph and port lookup for endpoint resolution
//! - [`adapter`] -- Glyph/arc to node/edge mapping and the record stream
//! - [`schema`] -- Schema configuration and record validation
//! - [`sink`] -- Ingestion interface, dry-run sink
//! - [`export`] -- neo4j-admin bulk import CSV writer
//! - [`import`] -- Neo4j Bolt writer
//! - [`pipeline`] -- Adapter to sink driver
//! - [`settings`] -- Pipeline configuration file
//! - [`models`] -- Records and property values
//! - [`stats`] -- Atomic counters for extraction metrics
//! - [`config`] -- Constants and defaults
//!
//! # Example Usage
//!
//! ```bash
//! # Run with config/pipeline_config.yaml
//! sysbio-kg -v
//!
//! # Export a compressed map as CSV
//! sysbio-kg run --input maps/insulin.sbgn.bz2 --mode csv --output out/
//!
//! # Print metadata and counts without loading anything
//! sysbio-kg inspect --input data/example.sbgn
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod index;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod settings;
pub mod sink;
pub mod stats;
