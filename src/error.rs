//! Adapter errors.
//!
//! [`AdapterError`] is fatal for a run. [`RecordError`] only ever drops the one
//! element it describes.

use std::path::PathBuf;
use thiserror::Error;

/// Document-level failures. Any of these ends the run.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Input file does not exist
    #[error("SBGN file not found: {0}")]
    NotFound(PathBuf),

    /// Input could not be opened or read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tokenizer rejected the document
    #[error("XML parse error at byte {position}: {source}")]
    Xml {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    /// Document is tokenizable but not a single well-formed element tree
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: usize, message: String },
}

impl AdapterError {
    /// True for failures caused by the document's content rather than by the
    /// filesystem.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, AdapterError::Xml { .. } | AdapterError::Malformed { .. })
    }
}

/// Element-level failures. Logged and counted, then the element is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("<{element}> at byte {position} is missing required attribute '{attribute}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
        position: usize,
    },

    #[error("<{element}> at byte {position} has non-numeric '{attribute}' value {value:?}")]
    InvalidNumber {
        element: &'static str,
        attribute: &'static str,
        value: String,
        position: usize,
    },
}
