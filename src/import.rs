use crate::models::{Edge, Node, Properties, PropertyValue};
use crate::schema::SchemaMapping;
use crate::settings::Neo4jConfig;
use crate::sink::{FirstSeen, GraphSink, SinkSummary};
use anyhow::{Context, Result};
use neo4rs::{query, BoltList, BoltMap, BoltString, BoltType, Graph};
use std::collections::BTreeMap;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Backtick-quotes a label or relationship type for Cypher.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn node_merge_cypher(base_label: &str, label: &str) -> String {
    format!(
        "UNWIND $rows AS row \
         MERGE (n:{base} {{id: row.id}}) \
         ON CREATE SET n += row.props, n:{label} \
         RETURN count(n) AS cnt",
        base = quote_ident(base_label),
        label = quote_ident(label),
    )
}

pub fn edge_merge_cypher(base_label: &str, rel_type: &str) -> String {
    format!(
        "UNWIND $rows AS row \
         MATCH (a:{base} {{id: row.source}}) \
         MATCH (b:{base} {{id: row.target}}) \
         MERGE (a)-[r:{rel} {{id: row.id}}]->(b) \
         ON CREATE SET r += row.props \
         RETURN count(r) AS cnt",
        base = quote_ident(base_label),
        rel = quote_ident(rel_type),
    )
}

pub fn index_cypher(base_label: &str) -> String {
    format!(
        "CREATE INDEX {name} IF NOT EXISTS FOR (n:{base}) ON (n.id)",
        name = quote_ident(&format!("{}_id", base_label.to_lowercase())),
        base = quote_ident(base_label),
    )
}

fn bolt_value(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::String(s) => BoltType::from(s.as_str()),
        PropertyValue::Integer(i) => BoltType::from(*i),
        PropertyValue::Float(f) => BoltType::from(*f),
        PropertyValue::Boolean(b) => BoltType::from(*b),
        PropertyValue::StringList(items) => {
            let mut list = BoltList::with_capacity(items.len());
            for item in items {
                list.push(BoltType::from(item.as_str()));
            }
            BoltType::List(list)
        }
    }
}

pub fn bolt_properties(properties: &Properties) -> BoltMap {
    let mut map = BoltMap::with_capacity(properties.len());
    for (key, value) in properties {
        map.put(BoltString::from(key.as_str()), bolt_value(value));
    }
    map
}

fn node_row(node: &Node) -> BoltType {
    let mut row = BoltMap::new();
    row.put(BoltString::from("id"), BoltType::from(node.id.as_str()));
    row.put(
        BoltString::from("props"),
        BoltType::Map(bolt_properties(&node.properties)),
    );
    BoltType::Map(row)
}

fn edge_row(edge: &Edge) -> BoltType {
    let mut row = BoltMap::new();
    row.put(BoltString::from("id"), BoltType::from(edge.id.as_str()));
    row.put(BoltString::from("source"), BoltType::from(edge.source.as_str()));
    row.put(BoltString::from("target"), BoltType::from(edge.target.as_str()));
    row.put(
        BoltString::from("props"),
        BoltType::Map(bolt_properties(&edge.properties)),
    );
    BoltType::Map(row)
}

/// Loads records into a running Neo4j over Bolt with batched `MERGE`s.
///
/// Rows are buffered per graph label and sent `batch_size` at a time. All
/// pending node batches are flushed before the first edge batch so edge
/// endpoints can be matched.
pub struct Neo4jSink {
    runtime: Runtime,
    graph: Graph,
    schema: SchemaMapping,
    base_label: String,
    batch_size: usize,
    pending_nodes: BTreeMap<String, Vec<BoltType>>,
    pending_edges: BTreeMap<String, Vec<BoltType>>,
    nodes_flushed: bool,
    seen: FirstSeen,
    summary: SinkSummary,
}

impl Neo4jSink {
    pub fn connect(config: &Neo4jConfig, schema: SchemaMapping) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .context("Failed to start async runtime")?;

        info!(uri = %config.uri, "Connecting to Neo4j");
        let graph = runtime.block_on(async {
            let graph = Graph::new(&config.uri, &config.user, &config.password)
                .with_context(|| format!("Cannot connect to Neo4j at {}", config.uri))?;
            run_cypher(&graph, "RETURN 1;")
                .await
                .with_context(|| format!("Neo4j at {} did not answer", config.uri))?;

            if config.wipe {
                warn!("Wiping all existing nodes and relationships");
                run_cypher(&graph, "MATCH (n) DETACH DELETE n").await?;
            }
            run_cypher(&graph, &index_cypher(&config.base_label)).await?;
            Ok::<_, anyhow::Error>(graph)
        })?;

        Ok(Self {
            runtime,
            graph,
            schema,
            base_label: config.base_label.clone(),
            batch_size: config.batch_size,
            pending_nodes: BTreeMap::new(),
            pending_edges: BTreeMap::new(),
            nodes_flushed: false,
            seen: FirstSeen::default(),
            summary: SinkSummary::default(),
        })
    }

    fn send(&self, cypher: &str, rows: Vec<BoltType>) -> Result<i64> {
        let expected = rows.len() as i64;
        let q = query(cypher).param("rows", BoltType::List(BoltList::from(rows)));
        let count = self.runtime.block_on(query_count(&self.graph, q, cypher))?;
        debug!(rows = expected, merged = count, "Batch written");
        Ok(expected - count)
    }

    fn flush_node_label(&mut self, label: &str) -> Result<()> {
        let Some(rows) = self.pending_nodes.remove(label) else {
            return Ok(());
        };
        if rows.is_empty() {
            return Ok(());
        }
        let cypher = node_merge_cypher(&self.base_label, label);
        self.send(&cypher, rows)?;
        Ok(())
    }

    fn flush_edge_type(&mut self, rel_type: &str) -> Result<()> {
        let Some(rows) = self.pending_edges.remove(rel_type) else {
            return Ok(());
        };
        if rows.is_empty() {
            return Ok(());
        }
        let cypher = edge_merge_cypher(&self.base_label, rel_type);
        let missing = self.send(&cypher, rows)?;
        if missing > 0 {
            warn!(
                rel_type,
                missing, "Relationships skipped because an endpoint node does not exist"
            );
        }
        Ok(())
    }

    fn flush_all_nodes(&mut self) -> Result<()> {
        let labels: Vec<String> = self.pending_nodes.keys().cloned().collect();
        for label in labels {
            self.flush_node_label(&label)?;
        }
        self.nodes_flushed = true;
        Ok(())
    }
}

impl GraphSink for Neo4jSink {
    fn write_node(&mut self, node: &Node) -> Result<()> {
        let label = self.schema.resolve_node(node)?.graph_label();
        if !self.seen.admit_node(node) {
            return Ok(());
        }

        let batch = self.pending_nodes.entry(label.clone()).or_default();
        batch.push(node_row(node));
        let full = batch.len() >= self.batch_size;
        self.summary.nodes_written += 1;
        if full {
            self.flush_node_label(&label)?;
        }
        Ok(())
    }

    fn write_edge(&mut self, edge: &Edge) -> Result<()> {
        let rel_type = self.schema.resolve_edge(edge)?.graph_label();
        if !self.nodes_flushed {
            self.flush_all_nodes()?;
        }
        if !self.seen.admit_edge(edge) {
            return Ok(());
        }

        let batch = self.pending_edges.entry(rel_type.clone()).or_default();
        batch.push(edge_row(edge));
        let full = batch.len() >= self.batch_size;
        self.summary.edges_written += 1;
        if full {
            self.flush_edge_type(&rel_type)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<SinkSummary> {
        self.flush_all_nodes()?;
        let types: Vec<String> = self.pending_edges.keys().cloned().collect();
        for rel_type in types {
            self.flush_edge_type(&rel_type)?;
        }

        let base = quote_ident(&self.base_label);
        let total = self.runtime.block_on(query_count(
            &self.graph,
            query(&format!("MATCH (n:{base}) RETURN count(n) AS cnt")),
            "node count",
        ))?;
        info!(total, "Neo4j load complete");

        self.summary.duplicates_dropped = self.seen.dropped();
        Ok(self.summary.clone())
    }
}

async fn run_cypher(graph: &Graph, cypher: &str) -> Result<()> {
    graph
        .run(query(cypher))
        .await
        .with_context(|| format!("Failed to execute: {cypher}"))?;
    Ok(())
}

async fn query_count(graph: &Graph, q: neo4rs::Query, what: &str) -> Result<i64> {
    let mut result = graph
        .execute(q)
        .await
        .with_context(|| format!("Failed to execute count query: {what}"))?;

    if let Some(row) = result.next().await? {
        let count: i64 = row.get("cnt").context("Missing 'cnt' field in result")?;
        Ok(count)
    } else {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_cypher_merges_on_base_label() {
        let cypher = node_merge_cypher("Entity", "SimpleChemical");
        assert!(cypher.starts_with("UNWIND $rows AS row"));
        assert!(cypher.contains("MERGE (n:`Entity` {id: row.id})"));
        assert!(cypher.contains("ON CREATE SET n += row.props, n:`SimpleChemical`"));
        assert!(cypher.ends_with("RETURN count(n) AS cnt"));
    }

    #[test]
    fn edge_cypher_matches_both_endpoints() {
        let cypher = edge_merge_cypher("Entity", "CATALYSIS");
        assert!(cypher.contains("MATCH (a:`Entity` {id: row.source})"));
        assert!(cypher.contains("MATCH (b:`Entity` {id: row.target})"));
        assert!(cypher.contains("MERGE (a)-[r:`CATALYSIS` {id: row.id}]->(b)"));
    }

    #[test]
    fn identifiers_are_escaped() {
        assert_eq!(quote_ident("Simple`Chem"), "`Simple``Chem`");
        assert_eq!(
            index_cypher("Entity"),
            "CREATE INDEX `entity_id` IF NOT EXISTS FOR (n:`Entity`) ON (n.id)"
        );
    }

    #[test]
    fn properties_convert_to_bolt() {
        let mut props = Properties::new();
        props.insert("name".to_string(), PropertyValue::from("ATP"));
        props.insert("x".to_string(), PropertyValue::from(2.5));
        props.insert(
            "unit_of_information".to_string(),
            PropertyValue::StringList(vec!["mt:prot".to_string()]),
        );
        let map = bolt_properties(&props);
        assert_eq!(map.value.len(), 3);
        assert_eq!(
            map.value.get(&BoltString::from("name")),
            Some(&BoltType::from("ATP"))
        );
        assert_eq!(
            map.value.get(&BoltString::from("x")),
            Some(&BoltType::from(2.5))
        );
        assert!(matches!(
            map.value.get(&BoltString::from("unit_of_information")),
            Some(BoltType::List(list)) if list.len() == 1
        ));
    }
}
