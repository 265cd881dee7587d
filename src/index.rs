use crate::error::AdapterError;
use crate::parser::{RawGlyph, SbgnElement, SbgnReader};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use tracing::{debug, info};

/// Glyph and port identifiers of one SBGN map, collected in a full pass over
/// the document before any record is produced. Building it is also what
/// proves the document well-formed.
#[derive(Debug, Default)]
pub struct GlyphIndex {
    glyph_ids: FxHashSet<String>,
    port_to_glyph: FxHashMap<String, String>,
    language: Option<String>,
    has_map: bool,
    glyph_count: u64,
    arc_count: u64,
}

impl GlyphIndex {
    pub fn build(path: &Path) -> Result<Self, AdapterError> {
        info!("Indexing SBGN map: {}", path.display());
        let index = Self::from_elements(SbgnReader::open(path)?)?;
        info!(
            glyphs = index.glyph_count,
            arcs = index.arc_count,
            ports = index.port_to_glyph.len(),
            "Index built successfully"
        );
        Ok(index)
    }

    pub fn from_elements<I>(elements: I) -> Result<Self, AdapterError>
    where
        I: IntoIterator<Item = Result<SbgnElement, AdapterError>>,
    {
        let mut index = Self::default();
        let mut root_glyphs = Vec::new();
        for element in elements {
            match element? {
                SbgnElement::Map { language, .. } => {
                    index.has_map = true;
                    if index.language.is_none() {
                        index.language = language;
                    }
                }
                SbgnElement::Glyph(glyph) if glyph.in_map => index.add_glyph(glyph),
                SbgnElement::Glyph(glyph) => root_glyphs.push(glyph),
                SbgnElement::Arc(_) => index.arc_count += 1,
            }
        }
        if index.has_map {
            if !root_glyphs.is_empty() {
                debug!(count = root_glyphs.len(), "Ignoring glyphs outside the map");
            }
        } else {
            for glyph in root_glyphs {
                index.add_glyph(glyph);
            }
        }
        Ok(index)
    }

    fn add_glyph(&mut self, glyph: RawGlyph) {
        self.glyph_count += 1;
        let Some(glyph_id) = glyph.id else {
            return;
        };
        for port in glyph.ports {
            if let Some(port_id) = port.id {
                self.port_to_glyph.insert(port_id, glyph_id.clone());
            }
        }
        self.glyph_ids.insert(glyph_id);
    }

    /// Maps an arc endpoint to the glyph it belongs to.
    ///
    /// A glyph id resolves to itself and a port id to its owning glyph. Ids of
    /// the form `glyph.n` that are in neither table fall back to the part
    /// before the last dot. Anything else is returned unchanged.
    pub fn resolve<'a>(&'a self, endpoint: &'a str) -> &'a str {
        if self.glyph_ids.contains(endpoint) {
            return endpoint;
        }
        if let Some(glyph_id) = self.port_to_glyph.get(endpoint) {
            return glyph_id;
        }
        if let Some((glyph_id, _)) = endpoint.rsplit_once('.') {
            if !glyph_id.is_empty() {
                debug!(endpoint, glyph = glyph_id, "Resolved endpoint by port naming");
                return glyph_id;
            }
        }
        debug!(endpoint, "Endpoint does not name a known glyph or port");
        endpoint
    }

    /// Whether the document has a `map` element. When it does, glyphs placed
    /// directly under the root are not part of the map.
    pub fn has_map(&self) -> bool {
        self.has_map
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn glyph_count(&self) -> u64 {
        self.glyph_count
    }

    pub fn arc_count(&self) -> u64 {
        self.arc_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{RawArc, RawGlyph, RawPoint, RawPort};

    fn glyph(id: &str, ports: &[&str]) -> Result<SbgnElement, AdapterError> {
        Ok(SbgnElement::Glyph(RawGlyph {
            id: Some(id.to_string()),
            ports: ports
                .iter()
                .map(|p| RawPort {
                    id: Some(p.to_string()),
                    point: RawPoint::default(),
                })
                .collect(),
            in_map: true,
            ..RawGlyph::default()
        }))
    }

    fn root_glyph(id: &str, ports: &[&str]) -> Result<SbgnElement, AdapterError> {
        glyph(id, ports).map(|element| match element {
            SbgnElement::Glyph(g) => SbgnElement::Glyph(RawGlyph { in_map: false, ..g }),
            other => other,
        })
    }

    fn make_index() -> GlyphIndex {
        GlyphIndex::from_elements(vec![
            Ok(SbgnElement::Map {
                id: None,
                language: Some("process description".to_string()),
            }),
            glyph("g1", &[]),
            glyph("pr1", &["pr1_in", "pr1_out"]),
            Ok(SbgnElement::Arc(RawArc::default())),
        ])
        .unwrap()
    }

    #[test]
    fn resolve_glyph_id() {
        let index = make_index();
        assert_eq!(index.resolve("g1"), "g1");
    }

    #[test]
    fn resolve_port_id() {
        let index = make_index();
        assert_eq!(index.resolve("pr1_in"), "pr1");
        assert_eq!(index.resolve("pr1_out"), "pr1");
    }

    #[test]
    fn resolve_dotted_port_naming() {
        let index = make_index();
        assert_eq!(index.resolve("pr7.2"), "pr7");
    }

    #[test]
    fn resolve_prefers_known_glyph_with_dot() {
        let index = GlyphIndex::from_elements(vec![glyph("v1.0", &[])]).unwrap();
        assert_eq!(index.resolve("v1.0"), "v1.0");
    }

    #[test]
    fn resolve_unknown_is_unchanged() {
        let index = make_index();
        assert_eq!(index.resolve("ghost"), "ghost");
        assert_eq!(index.resolve(".hidden"), ".hidden");
    }

    #[test]
    fn counts_and_language() {
        let index = make_index();
        assert_eq!(index.glyph_count(), 2);
        assert_eq!(index.arc_count(), 1);
        assert_eq!(index.language(), Some("process description"));
        assert!(index.has_map());
    }

    #[test]
    fn glyph_without_id_is_counted_not_indexed() {
        let index = GlyphIndex::from_elements(vec![Ok(SbgnElement::Glyph(RawGlyph::default()))])
            .unwrap();
        assert_eq!(index.glyph_count(), 1);
        assert_eq!(index.resolve(""), "");
    }

    #[test]
    fn root_glyphs_ignored_when_map_present() {
        let index = GlyphIndex::from_elements(vec![
            root_glyph("stray", &["stray_p"]),
            Ok(SbgnElement::Map {
                id: None,
                language: None,
            }),
            glyph("g1", &[]),
        ])
        .unwrap();
        assert_eq!(index.glyph_count(), 1);
        assert_eq!(index.resolve("stray_p"), "stray_p");
    }

    #[test]
    fn root_glyphs_count_without_map() {
        let index =
            GlyphIndex::from_elements(vec![root_glyph("g1", &[]), root_glyph("pr1", &["pr1_in"])])
                .unwrap();
        assert!(!index.has_map());
        assert_eq!(index.glyph_count(), 2);
        assert_eq!(index.resolve("pr1_in"), "pr1");
    }

    #[test]
    fn parse_error_propagates() {
        let result = GlyphIndex::from_elements(vec![
            glyph("g1", &[]),
            Err(AdapterError::Malformed {
                position: 0,
                message: "boom".to_string(),
            }),
        ]);
        assert!(result.is_err());
    }
}
