//! Schema configuration.
//!
//! A YAML document mapping entity names to the node or edge type they stand
//! for, the record labels that select them (`input_label`), and the
//! properties they may carry:
//!
//! ```yaml
//! simple chemical:
//!   represented_as: node
//!   input_label: simple chemical
//!   properties:
//!     name: str
//!     x: float
//! ```
//!
//! Sinks resolve every record against this mapping before writing it, so an
//! undeclared type or property never reaches the graph.

use crate::models::{Edge, Node, Properties, PropertyValue};
use anyhow::{bail, Context, Result};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    Node,
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum PropertyType {
    Str,
    Int,
    Float,
    Bool,
    StrList,
}

impl PropertyType {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::Str => "str",
            PropertyType::Int => "int",
            PropertyType::Float => "float",
            PropertyType::Bool => "bool",
            PropertyType::StrList => "str[]",
        }
    }

    /// Floats accept integers; nothing else is coerced.
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        matches!(
            (self, value),
            (PropertyType::Str, PropertyValue::String(_))
                | (PropertyType::Int, PropertyValue::Integer(_))
                | (PropertyType::Float, PropertyValue::Float(_))
                | (PropertyType::Float, PropertyValue::Integer(_))
                | (PropertyType::Bool, PropertyValue::Boolean(_))
                | (PropertyType::StrList, PropertyValue::StringList(_))
        )
    }

    /// Type suffix for a neo4j-admin CSV header column
    pub fn neo4j_header_type(&self) -> &'static str {
        match self {
            PropertyType::Str => "string",
            PropertyType::Int => "long",
            PropertyType::Float => "double",
            PropertyType::Bool => "boolean",
            PropertyType::StrList => "string[]",
        }
    }
}

impl TryFrom<String> for PropertyType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "str" | "string" => Ok(PropertyType::Str),
            "int" | "integer" | "long" => Ok(PropertyType::Int),
            "float" | "double" => Ok(PropertyType::Float),
            "bool" | "boolean" => Ok(PropertyType::Bool),
            "str[]" | "string[]" | "list" => Ok(PropertyType::StrList),
            other => Err(format!("unsupported property type '{other}'")),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One label or several
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LabelList {
    One(String),
    Many(Vec<String>),
}

impl LabelList {
    pub fn labels(&self) -> Vec<&str> {
        match self {
            LabelList::One(label) => vec![label.as_str()],
            LabelList::Many(labels) => labels.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaEntry {
    pub represented_as: Representation,
    pub input_label: LabelList,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyType>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    #[error("Node type '{0}' is not declared in the schema configuration")]
    UnknownNodeType(String),

    #[error("Edge type '{0}' is not declared in the schema configuration")]
    UnknownEdgeType(String),

    #[error("Property '{property}' of record '{record}' is not declared for '{entity}'")]
    UndeclaredProperty {
        entity: String,
        record: String,
        property: String,
    },

    #[error("Property '{property}' of record '{record}' must be {expected} for '{entity}', found {found}")]
    TypeMismatch {
        entity: String,
        record: String,
        property: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// A schema entity a record resolved to
#[derive(Debug, Clone, Copy)]
pub struct ResolvedEntity<'a> {
    pub name: &'a str,
    pub entry: &'a SchemaEntry,
}

impl ResolvedEntity<'_> {
    /// Graph label: PascalCase for nodes, UPPER_SNAKE_CASE for relationships.
    pub fn graph_label(&self) -> String {
        match self.entry.represented_as {
            Representation::Node => pascal_case(self.name),
            Representation::Edge => upper_snake_case(self.name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaMapping {
    entities: BTreeMap<String, SchemaEntry>,
    node_labels: FxHashMap<String, String>,
    edge_labels: FxHashMap<String, String>,
}

impl SchemaMapping {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema configuration: {}", path.display()))?;
        Self::from_yaml_str(&text)
            .with_context(|| format!("Invalid schema configuration: {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let entities: BTreeMap<String, SchemaEntry> =
            serde_yaml::from_str(text).context("Failed to parse schema YAML")?;
        if entities.is_empty() {
            bail!("Schema configuration declares no entities");
        }

        let mut node_labels = FxHashMap::default();
        let mut edge_labels = FxHashMap::default();
        for (name, entry) in &entities {
            let table = match entry.represented_as {
                Representation::Node => &mut node_labels,
                Representation::Edge => &mut edge_labels,
            };
            for label in entry.input_label.labels() {
                if let Some(previous) = table.insert(label.to_string(), name.clone()) {
                    bail!(
                        "Input label '{label}' is claimed by both '{previous}' and '{name}'"
                    );
                }
            }
        }

        Ok(Self {
            entities,
            node_labels,
            edge_labels,
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = ResolvedEntity<'_>> {
        self.entities
            .iter()
            .map(|(name, entry)| ResolvedEntity {
                name: name.as_str(),
                entry,
            })
    }

    pub fn resolve_node(&self, node: &Node) -> Result<ResolvedEntity<'_>, SchemaViolation> {
        let resolved = self
            .lookup(&self.node_labels, &node.label)
            .ok_or_else(|| SchemaViolation::UnknownNodeType(node.label.clone()))?;
        check_properties(resolved, &node.id, &node.properties)?;
        Ok(resolved)
    }

    pub fn resolve_edge(&self, edge: &Edge) -> Result<ResolvedEntity<'_>, SchemaViolation> {
        let resolved = self
            .lookup(&self.edge_labels, &edge.label)
            .ok_or_else(|| SchemaViolation::UnknownEdgeType(edge.label.clone()))?;
        check_properties(resolved, &edge.id, &edge.properties)?;
        Ok(resolved)
    }

    fn lookup<'a>(
        &'a self,
        table: &'a FxHashMap<String, String>,
        label: &str,
    ) -> Option<ResolvedEntity<'a>> {
        let (name, entry) = self.entities.get_key_value(table.get(label)?)?;
        Some(ResolvedEntity {
            name: name.as_str(),
            entry,
        })
    }
}

fn check_properties(
    resolved: ResolvedEntity<'_>,
    record_id: &str,
    properties: &Properties,
) -> Result<(), SchemaViolation> {
    for (key, value) in properties {
        match resolved.entry.properties.get(key) {
            None => {
                return Err(SchemaViolation::UndeclaredProperty {
                    entity: resolved.name.to_string(),
                    record: record_id.to_string(),
                    property: key.clone(),
                })
            }
            Some(declared) if !declared.accepts(value) => {
                return Err(SchemaViolation::TypeMismatch {
                    entity: resolved.name.to_string(),
                    record: record_id.to_string(),
                    property: key.clone(),
                    expected: declared.name(),
                    found: value.kind(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn words(name: &str) -> impl Iterator<Item = &str> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// `simple chemical` -> `SimpleChemical`
pub fn pascal_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for word in words(name) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// `necessary stimulation` -> `NECESSARY_STIMULATION`
pub fn upper_snake_case(name: &str) -> String {
    words(name)
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}
