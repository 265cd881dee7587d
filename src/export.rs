use crate::models::{Edge, Node, Properties};
use crate::schema::{ResolvedEntity, SchemaMapping};
use crate::sink::{FirstSeen, GraphSink, SinkSummary};
use anyhow::{Context, Result};
use csv::Writer;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const IMPORT_SCRIPT: &str = "neo4j-admin-import-call.sh";

/// One CSV file per graph label, header typed from the schema
struct LabelFile {
    path: PathBuf,
    columns: Vec<String>,
    writer: Writer<BufWriter<File>>,
}

impl LabelFile {
    fn create(path: PathBuf, header: Vec<String>, columns: Vec<String>) -> Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
        let mut writer = Writer::from_writer(BufWriter::with_capacity(128 * 1024, file));
        writer.write_record(&header)?;
        debug!(file = %path.display(), "Opened CSV output");
        Ok(Self {
            path,
            columns,
            writer,
        })
    }

    fn property_cells(&self, properties: &Properties) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| properties.get(c).map(|v| v.to_string()).unwrap_or_default())
            .collect()
    }
}

fn typed_columns(resolved: &ResolvedEntity<'_>) -> (Vec<String>, Vec<String>) {
    resolved
        .entry
        .properties
        .iter()
        .map(|(name, ty)| {
            (
                format!("{name}:{}", ty.neo4j_header_type()),
                name.clone(),
            )
        })
        .unzip()
}

/// Writes neo4j-admin bulk import files: `nodes_<Label>.csv`,
/// `edges_<TYPE>.csv`, and a shell script that runs the import.
pub struct CsvExportSink {
    schema: SchemaMapping,
    output_dir: PathBuf,
    base_label: String,
    node_files: BTreeMap<String, LabelFile>,
    edge_files: BTreeMap<String, LabelFile>,
    seen: FirstSeen,
    summary: SinkSummary,
}

impl CsvExportSink {
    pub fn new(schema: SchemaMapping, output_dir: impl AsRef<Path>, base_label: &str) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;
        Ok(Self {
            schema,
            output_dir,
            base_label: base_label.to_string(),
            node_files: BTreeMap::new(),
            edge_files: BTreeMap::new(),
            seen: FirstSeen::default(),
            summary: SinkSummary::default(),
        })
    }

    fn write_import_script(&self) -> Result<PathBuf> {
        let mut script = String::from("#!/bin/sh\nneo4j-admin database import full \\\n");
        script.push_str("  --delimiter=\",\" --array-delimiter=\";\" \\\n");
        script.push_str("  --overwrite-destination=true \\\n");
        for file in self.node_files.values() {
            script.push_str(&format!("  --nodes=\"{}\" \\\n", file.path.display()));
        }
        for file in self.edge_files.values() {
            script.push_str(&format!("  --relationships=\"{}\" \\\n", file.path.display()));
        }
        script.push_str("  neo4j\n");

        let path = self.output_dir.join(IMPORT_SCRIPT);
        fs::write(&path, script)
            .with_context(|| format!("Failed to write import script: {}", path.display()))?;
        Ok(path)
    }
}

impl GraphSink for CsvExportSink {
    fn write_node(&mut self, node: &Node) -> Result<()> {
        let resolved = self.schema.resolve_node(node)?;
        if !self.seen.admit_node(node) {
            return Ok(());
        }

        let label = resolved.graph_label();
        let file = match self.node_files.entry(label.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let (typed, columns) = typed_columns(&resolved);
                let mut header = vec!["id:ID".to_string()];
                header.extend(typed);
                header.push(":LABEL".to_string());
                let path = self.output_dir.join(format!("nodes_{label}.csv"));
                e.insert(LabelFile::create(path, header, columns)?)
            }
        };

        let mut row = Vec::with_capacity(file.columns.len() + 2);
        row.push(node.id.clone());
        row.extend(file.property_cells(&node.properties));
        row.push(format!("{};{}", self.base_label, label));
        file.writer.write_record(&row)?;

        self.summary.nodes_written += 1;
        Ok(())
    }

    fn write_edge(&mut self, edge: &Edge) -> Result<()> {
        let resolved = self.schema.resolve_edge(edge)?;
        if !self.seen.admit_edge(edge) {
            return Ok(());
        }

        let rel_type = resolved.graph_label();
        let file = match self.edge_files.entry(rel_type.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let (typed, columns) = typed_columns(&resolved);
                let mut header = vec![
                    ":START_ID".to_string(),
                    ":END_ID".to_string(),
                    "id:string".to_string(),
                ];
                header.extend(typed);
                header.push(":TYPE".to_string());
                let path = self.output_dir.join(format!("edges_{rel_type}.csv"));
                e.insert(LabelFile::create(path, header, columns)?)
            }
        };

        let mut row = Vec::with_capacity(file.columns.len() + 4);
        row.push(edge.source.clone());
        row.push(edge.target.clone());
        row.push(edge.id.clone());
        row.extend(file.property_cells(&edge.properties));
        row.push(rel_type);
        file.writer.write_record(&row)?;

        self.summary.edges_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<SinkSummary> {
        for file in self
            .node_files
            .values_mut()
            .chain(self.edge_files.values_mut())
        {
            file.writer
                .flush()
                .with_context(|| format!("Failed to flush {}", file.path.display()))?;
        }
        let script = self.write_import_script()?;
        info!(
            node_files = self.node_files.len(),
            edge_files = self.edge_files.len(),
            script = %script.display(),
            "CSV export complete"
        );

        self.summary.duplicates_dropped = self.seen.dropped();
        Ok(self.summary.clone())
    }
}
