//! Whole-batch failures
//!
//! Only problems with the document's top-level shape abort a transform.
//! Everything row-level is recovered inside the pipeline and reported
//! through the [`RunSummary`](crate::melt::RunSummary).

use thiserror::Error;

/// A document that cannot be transformed at all; no partial output is produced.
#[derive(Error, Debug)]
pub enum FatalInputError {
    /// The input bytes are not JSON
    #[error("document is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The root value is an array, string or other non-object
    #[error("document root must be an object, found {0}")]
    NotAnObject(&'static str),

    /// No `tracks` collection at the top level
    #[error("document has no top-level `tracks` collection")]
    MissingTracks,

    /// `tracks` exists but is not an array
    #[error("top-level `tracks` must be an array, found {0}")]
    TracksNotAnArray(&'static str),

    /// Neither `extracted_at` nor `extraction_timestamp` is usable and the
    /// configuration forbids defaulting to the current time
    #[error("document has no usable `extracted_at` timestamp")]
    MissingExtractedAt,
}

/// Name of a JSON value's type, for error messages
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
