//! Error types for parser plugins.
//!
//! Two layers exist:
//!
//! - [`RecordError`] describes why a single record failed. It never ends a
//!   pass; it is attached to the record's [`RecordDetail`](crate::RecordDetail)
//!   and handed to the sink together with the record.
//! - [`PluginError`] ends a pass or prevents one from starting.

use crate::value::ConversionError;

/// Per-record failure attached to record metadata.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// A row could not be decoded from the input.
    #[error("malformed row at line {line}: {message}")]
    Decode { line: u64, message: String },

    /// The record handed to a target parser is not a flat field list.
    #[error("record type '{found}' not supported")]
    Shape { found: &'static str },

    /// The record's field count does not match the schema.
    #[error("record has {found} fields but schema has {expected} columns")]
    Arity { expected: usize, found: usize },

    /// A field could not be coerced to its column's declared type.
    #[error("failed to convert column '{column}': {source}")]
    Conversion {
        column: String,
        #[source]
        source: ConversionError,
    },

    /// A coerced field could not be rendered as text.
    #[error("failed to stringify field {index}: {source}")]
    Stringify {
        index: usize,
        #[source]
        source: ConversionError,
    },

    /// Encoding the row into the output buffer failed.
    #[error("failed to write to buffer: {0}")]
    Encode(#[source] csv::Error),
}

/// Pass-level failure.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Neither an explicit schema nor schema inference is configured.
    #[error("schema cannot be inferred for plugin {plugin}")]
    SchemaInference { plugin: &'static str },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The underlying input stream failed.
    #[error("failed to read input: {0}")]
    Read(#[source] csv::Error),

    /// The underlying output stream failed while flushing.
    #[error("failed to write output: {0}")]
    Write(#[from] std::io::Error),

    /// A sink answered with [`SinkOutcome::Error`](crate::SinkOutcome::Error).
    #[error("sink rejected record: {0:#}")]
    Sink(anyhow::Error),
}
