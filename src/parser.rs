//! Streaming SBGN-ML reader.
//!
//! Walks the document with quick-xml events and hands back one
//! [`SbgnElement`] per top-level glyph or arc, with every attribute still as
//! raw text. Namespace prefixes are ignored, so libsbgn 0.2 and 0.3 documents
//! read the same way. Well-formedness is checked as the reader goes: an
//! unclosed element, a second root, text outside the root, a malformed
//! attribute, an unknown entity, or an empty document is an error.

use crate::config::READ_BUFFER_SIZE;
use crate::error::AdapterError;
use bzip2::read::BzDecoder;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBox {
    pub x: Option<String>,
    pub y: Option<String>,
    pub w: Option<String>,
    pub h: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPoint {
    pub x: Option<String>,
    pub y: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPort {
    pub id: Option<String>,
    pub point: RawPoint,
}

/// A glyph nested directly inside a top-level glyph (state variable, unit of
/// information, complex subunit).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawChildGlyph {
    pub id: Option<String>,
    pub class: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGlyph {
    pub id: Option<String>,
    pub class: Option<String>,
    pub orientation: Option<String>,
    pub label: Option<String>,
    pub bbox: Option<RawBox>,
    pub ports: Vec<RawPort>,
    pub children: Vec<RawChildGlyph>,
    /// False for a glyph sitting directly under the root element. Those only
    /// count when the document has no `map`.
    pub in_map: bool,
    /// Byte offset of the opening tag
    pub position: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArc {
    pub id: Option<String>,
    pub class: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub start: Option<RawPoint>,
    pub end: Option<RawPoint>,
    pub next: Vec<RawPoint>,
    /// Byte offset of the opening tag
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SbgnElement {
    Map {
        id: Option<String>,
        language: Option<String>,
    },
    Glyph(RawGlyph),
    Arc(RawArc),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Frame {
    Root,
    Map,
    TopGlyph,
    ChildGlyph,
    Arc,
    Other,
}

/// Element-tree bookkeeping, kept apart from the quick-xml reader so event
/// handling can borrow both at once.
#[derive(Default)]
struct TreeState {
    stack: Vec<Frame>,
    glyph: Option<RawGlyph>,
    arc: Option<RawArc>,
    root_seen: bool,
    /// Only the first `label` of a glyph counts
    label_seen: bool,
    child_label_seen: bool,
}

impl TreeState {
    fn open(&mut self, e: &BytesStart, position: usize) -> Result<Option<SbgnElement>, AdapterError> {
        let xml_err = |source| AdapterError::Xml { position, source };
        check_attributes(e, position)?;
        let parent = self.stack.last().copied();
        let mut emitted = None;

        let frame = match (e.local_name().as_ref(), parent) {
            (name, None) => {
                if self.root_seen {
                    return Err(AdapterError::Malformed {
                        position,
                        message: "content after the root element".to_string(),
                    });
                }
                self.root_seen = true;
                if name == b"map" {
                    emitted = Some(map_element(e).map_err(xml_err)?);
                    Frame::Map
                } else {
                    Frame::Root
                }
            }
            (b"map", Some(Frame::Root)) => {
                emitted = Some(map_element(e).map_err(xml_err)?);
                Frame::Map
            }
            (b"glyph", Some(Frame::Root | Frame::Map)) if self.glyph.is_none() => {
                self.glyph = Some(RawGlyph {
                    id: attr(e, b"id").map_err(xml_err)?,
                    class: attr(e, b"class").map_err(xml_err)?,
                    orientation: attr(e, b"orientation").map_err(xml_err)?,
                    in_map: parent == Some(Frame::Map),
                    position,
                    ..RawGlyph::default()
                });
                self.label_seen = false;
                Frame::TopGlyph
            }
            (b"glyph", Some(Frame::TopGlyph)) => {
                let child = RawChildGlyph {
                    id: attr(e, b"id").map_err(xml_err)?,
                    class: attr(e, b"class").map_err(xml_err)?,
                    label: None,
                };
                if let Some(glyph) = self.glyph.as_mut() {
                    glyph.children.push(child);
                }
                self.child_label_seen = false;
                Frame::ChildGlyph
            }
            (b"arc", _) if self.arc.is_none() && self.glyph.is_none() => {
                self.arc = Some(RawArc {
                    id: attr(e, b"id").map_err(xml_err)?,
                    class: attr(e, b"class").map_err(xml_err)?,
                    source: attr(e, b"source").map_err(xml_err)?,
                    target: attr(e, b"target").map_err(xml_err)?,
                    position,
                    ..RawArc::default()
                });
                Frame::Arc
            }
            (b"label", Some(Frame::TopGlyph)) if !self.label_seen => {
                self.label_seen = true;
                let text = attr(e, b"text").map_err(xml_err)?;
                if let Some(glyph) = self.glyph.as_mut() {
                    glyph.label = text;
                }
                Frame::Other
            }
            (b"label", Some(Frame::ChildGlyph)) if !self.child_label_seen => {
                self.child_label_seen = true;
                let text = attr(e, b"text").map_err(xml_err)?;
                if let Some(child) = self.glyph.as_mut().and_then(|g| g.children.last_mut()) {
                    child.label = text;
                }
                Frame::Other
            }
            (b"bbox", Some(Frame::TopGlyph))
                if self.glyph.as_ref().is_some_and(|g| g.bbox.is_none()) =>
            {
                let bbox = RawBox {
                    x: attr(e, b"x").map_err(xml_err)?,
                    y: attr(e, b"y").map_err(xml_err)?,
                    w: attr(e, b"w").map_err(xml_err)?,
                    h: attr(e, b"h").map_err(xml_err)?,
                };
                if let Some(glyph) = self.glyph.as_mut() {
                    glyph.bbox = Some(bbox);
                }
                Frame::Other
            }
            (b"port", Some(Frame::TopGlyph)) => {
                let port = RawPort {
                    id: attr(e, b"id").map_err(xml_err)?,
                    point: point(e).map_err(xml_err)?,
                };
                if let Some(glyph) = self.glyph.as_mut() {
                    glyph.ports.push(port);
                }
                Frame::Other
            }
            (tag @ (b"start" | b"end" | b"next"), _) if self.arc.is_some() => {
                let p = point(e).map_err(xml_err)?;
                if let Some(arc) = self.arc.as_mut() {
                    match tag {
                        b"start" => arc.start = Some(p),
                        b"end" => arc.end = Some(p),
                        _ => arc.next.push(p),
                    }
                }
                Frame::Other
            }
            _ => Frame::Other,
        };

        self.stack.push(frame);
        Ok(emitted)
    }

    fn close(&mut self, position: usize) -> Result<Option<SbgnElement>, AdapterError> {
        let frame = self.stack.pop().ok_or_else(|| AdapterError::Malformed {
            position,
            message: "closing tag without a matching opening tag".to_string(),
        })?;
        Ok(match frame {
            Frame::TopGlyph => self.glyph.take().map(SbgnElement::Glyph),
            Frame::Arc => self.arc.take().map(SbgnElement::Arc),
            _ => None,
        })
    }

    /// Character data is only allowed inside the root element.
    fn text(&self, t: &BytesText, position: usize) -> Result<(), AdapterError> {
        let text = t
            .unescape()
            .map_err(|source| AdapterError::Xml { position, source })?;
        if self.stack.is_empty() && !text.trim().is_empty() {
            return Err(AdapterError::Malformed {
                position,
                message: "text outside the root element".to_string(),
            });
        }
        Ok(())
    }

    fn finish(&self, position: usize) -> Result<(), AdapterError> {
        if !self.root_seen {
            return Err(AdapterError::Malformed {
                position,
                message: "document has no root element".to_string(),
            });
        }
        if !self.stack.is_empty() {
            return Err(AdapterError::Malformed {
                position,
                message: format!(
                    "unexpected end of document with {} element(s) still open",
                    self.stack.len()
                ),
            });
        }
        Ok(())
    }
}

/// Parses every attribute of a tag. quick-xml only checks attributes that
/// are read, so this runs on every opening tag.
fn check_attributes(e: &BytesStart, position: usize) -> Result<(), AdapterError> {
    for attribute in e.attributes() {
        let attribute = attribute.map_err(|source| AdapterError::Xml {
            position,
            source: source.into(),
        })?;
        if attribute.value.contains(&b'<') {
            return Err(AdapterError::Malformed {
                position,
                message: "'<' in an attribute value".to_string(),
            });
        }
        attribute
            .unescape_value()
            .map_err(|source| AdapterError::Xml { position, source })?;
    }
    Ok(())
}

/// Looks up an attribute by local name and unescapes its value.
fn attr(e: &BytesStart, name: &[u8]) -> Result<Option<String>, quick_xml::Error> {
    for attribute in e.attributes() {
        let attribute = attribute?;
        if attribute.key.local_name().as_ref() == name {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn point(e: &BytesStart) -> Result<RawPoint, quick_xml::Error> {
    Ok(RawPoint {
        x: attr(e, b"x")?,
        y: attr(e, b"y")?,
    })
}

fn map_element(e: &BytesStart) -> Result<SbgnElement, quick_xml::Error> {
    Ok(SbgnElement::Map {
        id: attr(e, b"id")?,
        language: attr(e, b"language")?,
    })
}

fn is_bz2(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("bz2"))
        .unwrap_or(false)
}

pub struct SbgnReader {
    reader: Reader<Box<dyn BufRead>>,
    buf: Vec<u8>,
    state: TreeState,
    finished: bool,
}

impl SbgnReader {
    /// Opens an SBGN-ML file; `.bz2` inputs are decompressed on the fly.
    pub fn open(path: &Path) -> Result<Self, AdapterError> {
        let file = File::open(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                AdapterError::NotFound(path.to_path_buf())
            } else {
                AdapterError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let input: Box<dyn BufRead> = if is_bz2(path) {
            Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                BzDecoder::new(file),
            ))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        };
        Ok(Self::from_reader(input))
    }

    pub fn from_reader<R: BufRead + 'static>(input: R) -> Self {
        let boxed: Box<dyn BufRead> = Box::new(input);
        let mut reader = Reader::from_reader(boxed);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::with_capacity(8 * 1024),
            state: TreeState::default(),
            finished: false,
        }
    }

    fn next_element(&mut self) -> Result<Option<SbgnElement>, AdapterError> {
        loop {
            let position = self.reader.buffer_position();
            let emitted = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => self.state.open(&e, position)?,
                Ok(Event::Empty(e)) => {
                    let opened = self.state.open(&e, position)?;
                    let closed = self.state.close(position)?;
                    opened.or(closed)
                }
                Ok(Event::End(_)) => self.state.close(position)?,
                Ok(Event::Text(t)) => {
                    self.state.text(&t, position)?;
                    None
                }
                Ok(Event::CData(_)) if self.state.stack.is_empty() => {
                    return Err(AdapterError::Malformed {
                        position,
                        message: "CDATA outside the root element".to_string(),
                    })
                }
                Ok(Event::Eof) => {
                    self.state.finish(position)?;
                    return Ok(None);
                }
                Ok(_) => None,
                Err(source) => {
                    return Err(AdapterError::Xml {
                        position: self.reader.buffer_position(),
                        source,
                    })
                }
            };
            self.buf.clear();

            if emitted.is_some() {
                return Ok(emitted);
            }
        }
    }
}

impl Iterator for SbgnReader {
    type Item = Result<SbgnElement, AdapterError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_element() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(xml: &str) -> Result<Vec<SbgnElement>, AdapterError> {
        SbgnReader::from_reader(Cursor::new(xml.as_bytes().to_vec())).collect()
    }

    fn glyphs(elements: &[SbgnElement]) -> Vec<&RawGlyph> {
        elements
            .iter()
            .filter_map(|e| match e {
                SbgnElement::Glyph(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    fn arcs(elements: &[SbgnElement]) -> Vec<&RawArc> {
        elements
            .iter()
            .filter_map(|e| match e {
                SbgnElement::Arc(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn reads_map_language() {
        let elements = read_all(
            r#"<sbgn xmlns="http://sbgn.org/libsbgn/0.2"><map language="process description"/></sbgn>"#,
        )
        .unwrap();
        assert_eq!(
            elements,
            vec![SbgnElement::Map {
                id: None,
                language: Some("process description".to_string())
            }]
        );
    }

    #[test]
    fn reads_glyph_with_label_bbox_and_ports() {
        let xml = r#"<sbgn><map>
            <glyph id="pr1" class="process" orientation="horizontal">
                <bbox x="10" y="20" w="24" h="24"/>
                <port id="pr1.1" x="5" y="32"/>
                <port id="pr1.2" x="39" y="32"/>
            </glyph>
            <glyph id="g1" class="macromolecule">
                <label text="Insulin"/>
                <bbox x="1.5" y="2" w="60" h="30"/>
            </glyph>
        </map></sbgn>"#;
        let elements = read_all(xml).unwrap();
        let glyphs = glyphs(&elements);
        assert_eq!(glyphs.len(), 2);

        assert_eq!(glyphs[0].id.as_deref(), Some("pr1"));
        assert_eq!(glyphs[0].orientation.as_deref(), Some("horizontal"));
        assert_eq!(glyphs[0].ports.len(), 2);
        assert_eq!(glyphs[0].ports[1].id.as_deref(), Some("pr1.2"));
        assert_eq!(glyphs[0].ports[1].point.x.as_deref(), Some("39"));
        assert!(glyphs[0].label.is_none());

        assert_eq!(glyphs[1].label.as_deref(), Some("Insulin"));
        let bbox = glyphs[1].bbox.as_ref().unwrap();
        assert_eq!(bbox.x.as_deref(), Some("1.5"));
        assert_eq!(bbox.h.as_deref(), Some("30"));
    }

    #[test]
    fn child_glyphs_are_not_top_level() {
        let xml = r#"<sbgn><map>
            <glyph id="g1" class="nucleic acid feature">
                <label text="INS"/>
                <bbox x="0" y="0" w="10" h="10"/>
                <glyph id="g1.uoi" class="unit of information">
                    <label text="ct:gene"/>
                    <bbox x="99" y="99" w="1" h="1"/>
                </glyph>
            </glyph>
        </map></sbgn>"#;
        let elements = read_all(xml).unwrap();
        let glyphs = glyphs(&elements);
        assert_eq!(glyphs.len(), 1);
        let glyph = glyphs[0];
        assert_eq!(glyph.label.as_deref(), Some("INS"));
        assert_eq!(glyph.bbox.as_ref().unwrap().x.as_deref(), Some("0"));
        assert_eq!(
            glyph.children,
            vec![RawChildGlyph {
                id: Some("g1.uoi".to_string()),
                class: Some("unit of information".to_string()),
                label: Some("ct:gene".to_string()),
            }]
        );
    }

    #[test]
    fn reads_arc_points_in_order() {
        let xml = r#"<sbgn><map>
            <arc id="a1" class="consumption" source="g1" target="pr1.1">
                <start x="1" y="2"/>
                <next x="3" y="4"/>
                <next x="5" y="6"/>
                <end x="7" y="8"/>
            </arc>
        </map></sbgn>"#;
        let elements = read_all(xml).unwrap();
        let arcs = arcs(&elements);
        assert_eq!(arcs.len(), 1);
        let arc = arcs[0];
        assert_eq!(arc.source.as_deref(), Some("g1"));
        assert_eq!(arc.target.as_deref(), Some("pr1.1"));
        assert_eq!(arc.start.as_ref().unwrap().x.as_deref(), Some("1"));
        assert_eq!(arc.end.as_ref().unwrap().y.as_deref(), Some("8"));
        let next: Vec<_> = arc.next.iter().map(|p| p.x.as_deref().unwrap()).collect();
        assert_eq!(next, vec!["3", "5"]);
    }

    #[test]
    fn arcs_inside_arcgroups_are_read() {
        let xml = r#"<sbgn><map>
            <arcgroup class="interaction">
                <arc id="a1" class="assignment" source="x" target="y"/>
            </arcgroup>
        </map></sbgn>"#;
        let elements = read_all(xml).unwrap();
        assert_eq!(arcs(&elements).len(), 1);
    }

    #[test]
    fn glyphs_inside_arcs_are_ignored() {
        let xml = r#"<sbgn><map>
            <arc id="a1" class="consumption" source="x" target="y">
                <glyph id="card" class="cardinality"><label text="2"/></glyph>
            </arc>
        </map></sbgn>"#;
        let elements = read_all(xml).unwrap();
        assert!(glyphs(&elements).is_empty());
        assert_eq!(arcs(&elements).len(), 1);
    }

    #[test]
    fn namespace_prefixes_are_ignored() {
        let xml = r#"<s:sbgn xmlns:s="http://sbgn.org/libsbgn/0.3"><s:map>
            <s:glyph s:id="g1" class="macromolecule"><s:label text="A"/></s:glyph>
        </s:map></s:sbgn>"#;
        let elements = read_all(xml).unwrap();
        let glyphs = glyphs(&elements);
        assert_eq!(glyphs.len(), 1);
        assert_eq!(glyphs[0].id.as_deref(), Some("g1"));
        assert_eq!(glyphs[0].label.as_deref(), Some("A"));
    }

    #[test]
    fn glyphs_without_map_use_root() {
        let xml = r#"<sbgn><glyph id="g1" class="macromolecule"/></sbgn>"#;
        let elements = read_all(xml).unwrap();
        let glyphs = glyphs(&elements);
        assert_eq!(glyphs.len(), 1);
        assert!(!glyphs[0].in_map);
    }

    #[test]
    fn glyphs_record_whether_they_sit_in_the_map() {
        let xml = r#"<sbgn>
            <glyph id="stray" class="macromolecule"/>
            <map><glyph id="g1" class="macromolecule"/></map>
        </sbgn>"#;
        let elements = read_all(xml).unwrap();
        let in_map: Vec<(Option<&str>, bool)> = glyphs(&elements)
            .iter()
            .map(|g| (g.id.as_deref(), g.in_map))
            .collect();
        assert_eq!(in_map, vec![(Some("stray"), false), (Some("g1"), true)]);
    }

    #[test]
    fn first_label_and_bbox_win() {
        let xml = r#"<sbgn><map>
            <glyph id="g1" class="macromolecule">
                <label text="first"/>
                <bbox x="1" y="1" w="1" h="1"/>
                <glyph id="g1.uoi" class="unit of information">
                    <label text="mt:prot"/>
                    <label text="ignored"/>
                </glyph>
                <label text="second"/>
                <bbox x="2" y="2" w="2" h="2"/>
            </glyph>
        </map></sbgn>"#;
        let elements = read_all(xml).unwrap();
        let glyph = glyphs(&elements)[0];
        assert_eq!(glyph.label.as_deref(), Some("first"));
        assert_eq!(glyph.bbox.as_ref().unwrap().x.as_deref(), Some("1"));
        assert_eq!(glyph.children[0].label.as_deref(), Some("mt:prot"));
    }

    #[test]
    fn unescapes_attribute_values() {
        let xml = r#"<sbgn><map><glyph id="g1"><label text="A &amp; B"/></glyph></map></sbgn>"#;
        let elements = read_all(xml).unwrap();
        assert_eq!(glyphs(&elements)[0].label.as_deref(), Some("A & B"));
    }

    #[test]
    fn mismatched_tags_fail() {
        let err = read_all("<sbgn><map></sbgn>").unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn unclosed_document_fails() {
        let err = read_all(r#"<sbgn><map><glyph id="g1" class="macromolecule"/>"#).unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));
    }

    #[test]
    fn empty_document_fails() {
        let err = read_all("").unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));

        let err = read_all("not xml at all").unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn second_root_fails() {
        let err = read_all("<sbgn/><sbgn/>").unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));
    }

    #[test]
    fn text_outside_root_fails() {
        let err = read_all("junk<sbgn><map/></sbgn>").unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));

        let err = read_all("<sbgn><map/></sbgn>trailing").unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));
    }

    #[test]
    fn whitespace_and_comments_around_root_are_fine() {
        let xml = "<?xml version=\"1.0\"?>\n<!-- map -->\n<sbgn><map/></sbgn>\n";
        assert_eq!(read_all(xml).unwrap().len(), 1);
    }

    #[test]
    fn malformed_attributes_fail_even_when_unread() {
        let err = read_all("<sbgn xmlns=oops><map/></sbgn>").unwrap_err();
        assert!(err.is_parse_error());

        let err = read_all(
            r#"<sbgn><map><glyph id="g1" compartmentRef="a<b"/></map></sbgn>"#,
        )
        .unwrap_err();
        assert!(err.is_parse_error());

        let err = read_all(r#"<sbgn><map><glyph id="g1" notes="&nope;"/></map></sbgn>"#)
            .unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn unknown_entity_in_text_fails() {
        let err = read_all(r#"<sbgn><map><notes>&bogus;</notes></map></sbgn>"#).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn iteration_stops_after_error() {
        let mut reader =
            SbgnReader::from_reader(Cursor::new(b"<sbgn><map></sbgn>".to_vec()));
        let mut saw_error = false;
        for item in reader.by_ref() {
            if item.is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
        assert!(reader.next().is_none());
    }

    #[test]
    fn open_missing_file_reports_not_found() {
        let err = SbgnReader::open(Path::new("/nonexistent/map.sbgn")).err().unwrap();
        assert!(matches!(err, AdapterError::NotFound(_)));
    }
}
