use crate::config::{ADAPTER_DATA_TYPE, ADAPTER_NAME, ADAPTER_VERSION, EDGE_ID_HASH_LEN};
use crate::error::{AdapterError, RecordError};
use crate::index::GlyphIndex;
use crate::models::{AdapterMetadata, Edge, Node, Properties, PropertyValue, Record};
use crate::parser::{RawArc, RawGlyph, RawPoint, SbgnElement, SbgnReader};
use crate::stats::ExtractionStats;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const UNKNOWN_CLASS: &str = "unknown";
const UNIT_OF_INFORMATION: &str = "unit of information";

/// Node label for an SBGN glyph class. Names follow the SBO terms the schema
/// configuration declares.
pub fn node_type_for(glyph_class: &str) -> &'static str {
    match glyph_class {
        "macromolecule" => "macromolecule",
        "nucleic acid feature" => "information macromolecule",
        "simple chemical" => "simple chemical",
        "process" => "process",
        "source and sink" => "sink reaction",
        "compartment" => "compartment",
        "phenotype" => "phenotype",
        "perturbation" => "perturbation",
        _ => "biological_entity",
    }
}

/// Edge label for an SBGN arc class
pub fn edge_type_for(arc_class: &str) -> &'static str {
    match arc_class {
        "consumption" => "consumption",
        "production" => "production",
        "inhibition" => "inhibition",
        "necessary stimulation" => "necessary_stimulation",
        "catalysis" => "catalysis",
        "modulation" => "modifier",
        "stimulation" => "stimulation",
        "equivalence arc" => "equivalence",
        _ => "interaction",
    }
}

/// Id for an arc that carries none: the leading hex digits of
/// MD5(`{source}_{target}_{class}`).
///
/// The parts are joined with `_` and not escaped, so endpoints that contain
/// underscores can produce the same key (`a_b` + `c` and `a` + `b_c`). Two
/// such arcs of the same class share an id and the sinks keep the first.
pub fn derived_edge_id(source: &str, target: &str, arc_class: &str) -> String {
    let digest = Md5::digest(format!("{source}_{target}_{arc_class}").as_bytes());
    let mut id = format!("{digest:x}");
    id.truncate(EDGE_ID_HASH_LEN);
    id
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Missing coordinates on a present element read as 0.0.
fn coordinate(
    value: Option<&str>,
    element: &'static str,
    attribute: &'static str,
    position: usize,
) -> Result<f64, RecordError> {
    let Some(raw) = value else {
        return Ok(0.0);
    };
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RecordError::InvalidNumber {
            element,
            attribute,
            value: raw.to_string(),
            position,
        })
}

fn point(
    p: &RawPoint,
    element: &'static str,
    position: usize,
) -> Result<(f64, f64), RecordError> {
    Ok((
        coordinate(p.x.as_deref(), element, "x", position)?,
        coordinate(p.y.as_deref(), element, "y", position)?,
    ))
}

pub fn glyph_to_node(glyph: &RawGlyph) -> Result<Node, RecordError> {
    let id = non_empty(glyph.id.as_deref()).ok_or(RecordError::MissingAttribute {
        element: "glyph",
        attribute: "id",
        position: glyph.position,
    })?;
    let class = glyph.class.as_deref().unwrap_or(UNKNOWN_CLASS);

    let mut properties = Properties::new();
    properties.insert("sbgn_class".to_string(), class.into());
    properties.insert("sbgn_id".to_string(), id.into());

    if let Some(label) = non_empty(glyph.label.as_deref()) {
        properties.insert("name".to_string(), label.into());
        properties.insert("label".to_string(), label.into());
    }

    if let Some(bbox) = &glyph.bbox {
        let pos = glyph.position;
        let x = coordinate(bbox.x.as_deref(), "bbox", "x", pos)?;
        let y = coordinate(bbox.y.as_deref(), "bbox", "y", pos)?;
        let w = coordinate(bbox.w.as_deref(), "bbox", "w", pos)?;
        let h = coordinate(bbox.h.as_deref(), "bbox", "h", pos)?;
        properties.insert("x".to_string(), x.into());
        properties.insert("y".to_string(), y.into());
        properties.insert("width".to_string(), w.into());
        properties.insert("height".to_string(), h.into());
    }

    if let Some(orientation) = non_empty(glyph.orientation.as_deref()) {
        properties.insert("orientation".to_string(), orientation.into());
    }

    let units: Vec<String> = glyph
        .children
        .iter()
        .filter(|child| child.class.as_deref() == Some(UNIT_OF_INFORMATION))
        .filter_map(|child| non_empty(child.label.as_deref()))
        .map(str::to_string)
        .collect();
    if !units.is_empty() {
        properties.insert(
            "unit_of_information".to_string(),
            PropertyValue::StringList(units),
        );
    }

    Ok(Node {
        id: id.to_string(),
        label: node_type_for(class).to_string(),
        properties,
    })
}

pub fn arc_to_edge(arc: &RawArc, index: &GlyphIndex) -> Result<Edge, RecordError> {
    let pos = arc.position;
    let source = non_empty(arc.source.as_deref()).ok_or(RecordError::MissingAttribute {
        element: "arc",
        attribute: "source",
        position: pos,
    })?;
    let target = non_empty(arc.target.as_deref()).ok_or(RecordError::MissingAttribute {
        element: "arc",
        attribute: "target",
        position: pos,
    })?;
    let source = index.resolve(source);
    let target = index.resolve(target);
    let class = arc.class.as_deref().unwrap_or(UNKNOWN_CLASS);
    let arc_id = non_empty(arc.id.as_deref());

    let mut properties = Properties::new();
    properties.insert("sbgn_arc_class".to_string(), class.into());
    if let Some(arc_id) = arc_id {
        properties.insert("sbgn_arc_id".to_string(), arc_id.into());
    }

    if let Some(start) = &arc.start {
        let (x, y) = point(start, "start", pos)?;
        properties.insert("start_x".to_string(), x.into());
        properties.insert("start_y".to_string(), y.into());
    }
    if let Some(end) = &arc.end {
        let (x, y) = point(end, "end", pos)?;
        properties.insert("end_x".to_string(), x.into());
        properties.insert("end_y".to_string(), y.into());
    }

    if !arc.next.is_empty() {
        let mut points = Vec::with_capacity(arc.next.len());
        for p in &arc.next {
            let (x, y) = point(p, "next", pos)?;
            points.push(format!("{x:?},{y:?}"));
        }
        properties.insert(
            "intermediate_points".to_string(),
            points.join("|").into(),
        );
    }

    Ok(Edge {
        id: arc_id
            .map(str::to_string)
            .unwrap_or_else(|| derived_edge_id(source, target, class)),
        source: source.to_string(),
        target: target.to_string(),
        label: edge_type_for(class).to_string(),
        properties,
    })
}

/// Reads one SBGN-ML map and turns it into graph records.
///
/// Opening the adapter indexes the whole document, so a malformed file fails
/// here before a single record exists. The records themselves are produced
/// lazily by [`SbgnAdapter::into_records`], which consumes the adapter.
pub struct SbgnAdapter {
    source: PathBuf,
    index: GlyphIndex,
    stats: Arc<ExtractionStats>,
}

impl SbgnAdapter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let source = path.as_ref().to_path_buf();
        let index = GlyphIndex::build(&source)?;
        info!(
            "Initialized {} with data source: {}",
            ADAPTER_NAME,
            source.display()
        );
        Ok(Self {
            source,
            index,
            stats: Arc::new(ExtractionStats::new()),
        })
    }

    pub fn stats(&self) -> Arc<ExtractionStats> {
        Arc::clone(&self.stats)
    }

    pub fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: ADAPTER_NAME.to_string(),
            data_source: self.source.display().to_string(),
            data_type: ADAPTER_DATA_TYPE.to_string(),
            version: ADAPTER_VERSION.to_string(),
            adapter_class: ADAPTER_NAME.to_string(),
            sbgn_language: self.index.language().map(str::to_string),
            glyph_count: self.index.glyph_count(),
            arc_count: self.index.arc_count(),
        }
    }

    /// All nodes in document order, then all edges in document order.
    pub fn into_records(self) -> Result<RecordStream, AdapterError> {
        info!("Extracting nodes from SBGN file");
        let reader = SbgnReader::open(&self.source)?;
        Ok(RecordStream {
            source: self.source,
            index: self.index,
            stats: self.stats,
            phase: Phase::Nodes(reader),
        })
    }
}

/// True when `path` is a regular file holding a well-formed SBGN-ML document.
pub fn validate_data_source(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    if !path.is_file() {
        warn!("Data source is not a readable file: {}", path.display());
        return false;
    }
    match GlyphIndex::build(path) {
        Ok(_) => true,
        Err(e) => {
            error!("Data source validation failed: {e}");
            false
        }
    }
}

enum Phase {
    Nodes(SbgnReader),
    Edges(SbgnReader),
    Done,
}

/// Single-use stream of records. Once it has returned `None` or an error it
/// stays exhausted.
pub struct RecordStream {
    source: PathBuf,
    index: GlyphIndex,
    stats: Arc<ExtractionStats>,
    phase: Phase,
}

impl RecordStream {
    pub fn stats(&self) -> Arc<ExtractionStats> {
        Arc::clone(&self.stats)
    }

    fn map_glyph(&self, glyph: &RawGlyph) -> Option<Node> {
        self.stats.inc_glyphs();
        match glyph_to_node(glyph) {
            Ok(node) => {
                self.stats.inc_nodes();
                Some(node)
            }
            Err(e) => {
                warn!(error = %e, "Skipping glyph");
                self.stats.inc_glyphs_skipped();
                None
            }
        }
    }

    fn map_arc(&self, arc: &RawArc) -> Option<Edge> {
        self.stats.inc_arcs();
        match arc_to_edge(arc, &self.index) {
            Ok(edge) => {
                self.stats.inc_edges();
                Some(edge)
            }
            Err(e) => {
                warn!(error = %e, "Skipping arc");
                self.stats.inc_arcs_skipped();
                None
            }
        }
    }
}

impl Iterator for RecordStream {
    type Item = Result<Record, AdapterError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let element = match &mut self.phase {
                Phase::Nodes(reader) | Phase::Edges(reader) => reader.next(),
                Phase::Done => return None,
            };
            let in_node_phase = matches!(self.phase, Phase::Nodes(_));

            match element {
                None if in_node_phase => {
                    info!(nodes = self.stats.nodes(), "Extracted nodes from SBGN file");
                    info!("Extracting edges from SBGN file");
                    match SbgnReader::open(&self.source) {
                        Ok(reader) => self.phase = Phase::Edges(reader),
                        Err(e) => {
                            self.phase = Phase::Done;
                            return Some(Err(e));
                        }
                    }
                }
                None => {
                    info!(edges = self.stats.edges(), "Extracted edges from SBGN file");
                    self.phase = Phase::Done;
                    return None;
                }
                Some(Err(e)) => {
                    self.phase = Phase::Done;
                    return Some(Err(e));
                }
                Some(Ok(SbgnElement::Glyph(glyph))) if in_node_phase => {
                    if !glyph.in_map && self.index.has_map() {
                        debug!(position = glyph.position, "Ignoring glyph outside the map");
                        continue;
                    }
                    if let Some(node) = self.map_glyph(&glyph) {
                        return Some(Ok(Record::Node(node)));
                    }
                }
                Some(Ok(SbgnElement::Arc(arc))) if !in_node_phase => {
                    if let Some(edge) = self.map_arc(&arc) {
                        return Some(Ok(Record::Edge(edge)));
                    }
                }
                Some(Ok(_)) => {}
            }
        }
    }
}
