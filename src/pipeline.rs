use crate::adapter::SbgnAdapter;
use crate::config::PROGRESS_INTERVAL;
use crate::export::CsvExportSink;
use crate::import::Neo4jSink;
use crate::models::Record;
use crate::schema::SchemaMapping;
use crate::settings::{OutputMode, PipelineConfig};
use crate::sink::{DryRunSink, GraphSink, SinkSummary};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;

/// What one pipeline run did
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    /// Records handed to the sink, keyed by adapter label
    pub nodes_by_label: BTreeMap<String, u64>,
    pub edges_by_label: BTreeMap<String, u64>,
    pub skipped_glyphs: u64,
    pub skipped_arcs: u64,
    pub sink: SinkSummary,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl PipelineSummary {
    pub fn nodes(&self) -> u64 {
        self.nodes_by_label.values().sum()
    }

    pub fn edges(&self) -> u64 {
        self.edges_by_label.values().sum()
    }
}

/// Builds the sink the configuration asks for.
pub fn open_sink(config: &PipelineConfig, schema: SchemaMapping) -> Result<Box<dyn GraphSink>> {
    let sink: Box<dyn GraphSink> = match config.output.mode {
        OutputMode::DryRun => Box::new(DryRunSink::new(schema)),
        OutputMode::Csv => Box::new(CsvExportSink::new(
            schema,
            &config.output.directory,
            &config.neo4j.base_label,
        )?),
        OutputMode::Neo4j => Box::new(Neo4jSink::connect(&config.neo4j, schema)?),
    };
    Ok(sink)
}

/// Loads the schema, opens the adapter, and streams every record into the
/// configured sink.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineSummary> {
    let schema = SchemaMapping::load(&config.schema_config)?;
    info!(
        entities = schema.entities().count(),
        "Loaded schema configuration"
    );
    let adapter = SbgnAdapter::open(&config.input)?;
    let mut sink = open_sink(config, schema)?;
    run_with_sink(adapter, sink.as_mut())
}

/// Nodes reach the sink before any edge. The first adapter or sink error
/// stops the run.
pub fn run_with_sink(adapter: SbgnAdapter, sink: &mut dyn GraphSink) -> Result<PipelineSummary> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    run_with_spinner(adapter, sink, &pb)
}

/// The spinner is cleared whether the run succeeds or fails.
fn run_with_spinner(
    adapter: SbgnAdapter,
    sink: &mut dyn GraphSink,
    pb: &ProgressBar,
) -> Result<PipelineSummary> {
    let start = Instant::now();
    let outcome = stream_records(adapter, sink, pb);
    pb.finish_and_clear();

    let mut summary = outcome?;
    summary.elapsed = start.elapsed();
    info!(
        nodes = summary.nodes(),
        edges = summary.edges(),
        skipped = summary.skipped_glyphs + summary.skipped_arcs,
        duration_secs = summary.elapsed.as_secs_f64(),
        "Pipeline complete"
    );
    Ok(summary)
}

fn stream_records(
    adapter: SbgnAdapter,
    sink: &mut dyn GraphSink,
    pb: &ProgressBar,
) -> Result<PipelineSummary> {
    let mut summary = PipelineSummary::default();
    let records = adapter.into_records()?;
    let stats = records.stats();
    let mut processed = 0u64;

    for record in records {
        match record? {
            Record::Node(node) => {
                sink.write_node(&node)?;
                *summary.nodes_by_label.entry(node.label).or_default() += 1;
            }
            Record::Edge(edge) => {
                sink.write_edge(&edge)?;
                *summary.edges_by_label.entry(edge.label).or_default() += 1;
            }
        }
        processed += 1;
        if processed % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!("Processed {processed} records"));
            pb.tick();
        }
    }

    summary.sink = sink.finish()?;
    summary.skipped_glyphs = stats.skipped_glyphs();
    summary.skipped_arcs = stats.skipped_arcs();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, Node};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sbgn xmlns="http://sbgn.org/libsbgn/0.2">
  <map language="process description">
    <glyph id="g1" class="simple chemical"><label text="ATP"/><bbox x="0" y="0" w="10" h="10"/></glyph>
    <glyph id="g2" class="macromolecule"><label text="Kinase"/></glyph>
    <glyph id="pr1" class="process"><port id="pr1.1" x="1" y="1"/></glyph>
    <arc id="a1" class="consumption" source="g1" target="pr1.1"/>
    <arc id="a2" class="catalysis" source="g2" target="pr1"/>
  </map>
</sbgn>"#;

    /// Remembers the order records arrived in
    #[derive(Default)]
    struct RecordingSink {
        order: Vec<String>,
        fail_on: Option<String>,
    }

    impl GraphSink for RecordingSink {
        fn write_node(&mut self, node: &Node) -> Result<()> {
            if self.fail_on.as_deref() == Some(node.id.as_str()) {
                anyhow::bail!("refused {}", node.id);
            }
            self.order.push(format!("node:{}", node.id));
            Ok(())
        }

        fn write_edge(&mut self, edge: &Edge) -> Result<()> {
            self.order.push(format!("edge:{}", edge.id));
            Ok(())
        }

        fn finish(&mut self) -> Result<SinkSummary> {
            Ok(SinkSummary::default())
        }
    }

    fn map_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MAP.as_bytes()).unwrap();
        file
    }

    #[test]
    fn nodes_precede_edges() {
        let file = map_file();
        let adapter = SbgnAdapter::open(file.path()).unwrap();
        let mut sink = RecordingSink::default();
        let summary = run_with_sink(adapter, &mut sink).unwrap();

        assert_eq!(
            sink.order,
            vec!["node:g1", "node:g2", "node:pr1", "edge:a1", "edge:a2"]
        );
        assert_eq!(summary.nodes(), 3);
        assert_eq!(summary.edges(), 2);
        assert_eq!(summary.nodes_by_label["simple chemical"], 1);
        assert_eq!(summary.edges_by_label["catalysis"], 1);
    }

    #[test]
    fn sink_error_stops_the_run() {
        let file = map_file();
        let adapter = SbgnAdapter::open(file.path()).unwrap();
        let mut sink = RecordingSink {
            fail_on: Some("g2".to_string()),
            ..Default::default()
        };
        let err = run_with_sink(adapter, &mut sink).unwrap_err();
        assert!(err.to_string().contains("refused g2"));
        assert_eq!(sink.order, vec!["node:g1"]);
    }

    #[test]
    fn spinner_cleared_when_sink_fails() {
        let file = map_file();
        let adapter = SbgnAdapter::open(file.path()).unwrap();
        let mut sink = RecordingSink {
            fail_on: Some("g1".to_string()),
            ..Default::default()
        };
        let pb = ProgressBar::hidden();
        assert!(run_with_spinner(adapter, &mut sink, &pb).is_err());
        assert!(pb.is_finished());
    }

    #[test]
    fn spinner_cleared_after_success() {
        let file = map_file();
        let adapter = SbgnAdapter::open(file.path()).unwrap();
        let pb = ProgressBar::hidden();
        run_with_spinner(adapter, &mut RecordingSink::default(), &pb).unwrap();
        assert!(pb.is_finished());
    }
}
