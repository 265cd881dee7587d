use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A normalized property value. Serialized untagged so JSON output reads as
/// plain primitives.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    StringList(Vec<String>),
}

impl PropertyValue {
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "str",
            PropertyValue::Integer(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Boolean(_) => "bool",
            PropertyValue::StringList(_) => "str[]",
        }
    }
}

impl fmt::Display for PropertyValue {
    /// Renders the value the way neo4j-admin expects it in a CSV cell.
    /// List items are joined with `;`, the default array delimiter.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Boolean(b) => write!(f, "{b}"),
            PropertyValue::StringList(items) => f.write_str(&items.join(";")),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(v: Vec<String>) -> Self {
        PropertyValue::StringList(v)
    }
}

/// Ordered so that two runs over the same input serialize identically.
/// A property that is not in the map is absent; there is no null value.
pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Node(Node),
    Edge(Edge),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::Node(n) => &n.id,
            Record::Edge(e) => &e.id,
        }
    }
}

/// Describes the data source an adapter was opened against
#[derive(Debug, Clone, Serialize)]
pub struct AdapterMetadata {
    pub name: String,
    pub data_source: String,
    pub data_type: String,
    pub version: String,
    pub adapter_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sbgn_language: Option<String>,
    pub glyph_count: u64,
    pub arc_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_csv_cell_format() {
        assert_eq!(PropertyValue::from("Insulin").to_string(), "Insulin");
        assert_eq!(PropertyValue::from(12.5).to_string(), "12.5");
        assert_eq!(PropertyValue::from(3i64).to_string(), "3");
        assert_eq!(PropertyValue::from(true).to_string(), "true");
        assert_eq!(
            PropertyValue::from(vec!["mt:prot".to_string(), "ct:gene".to_string()]).to_string(),
            "mt:prot;ct:gene"
        );
    }

    #[test]
    fn record_serializes_with_kind_tag() {
        let mut properties = Properties::new();
        properties.insert("name".to_string(), PropertyValue::from("ATP"));
        let record = Record::Node(Node {
            id: "glyph1".to_string(),
            label: "simple chemical".to_string(),
            properties,
        });
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"node","id":"glyph1","label":"simple chemical","properties":{"name":"ATP"}}"#
        );
    }

    #[test]
    fn properties_serialize_in_key_order() {
        let mut properties = Properties::new();
        properties.insert("y".to_string(), PropertyValue::from(2.0));
        properties.insert("x".to_string(), PropertyValue::from(1.0));
        let json = serde_json::to_string(&properties).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.0}"#);
    }
}
