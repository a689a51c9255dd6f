//! # DSV Core - Record Protocol for Delimited-Text Parsers
//!
//! This crate provides the foundational types and traits shared by DSV source
//! and target parsers. It defines the streaming record protocol, the schema and
//! value models, the plugin interfaces, and the configuration structures used
//! throughout the DSV workspace.
//!
//! ## Key Components
//!
//! - **Record Protocol**: records are pushed one at a time to a [`RecordSink`]
//!   together with a [`RecordDetail`]; the sink answers with a [`SinkOutcome`]
//! - **Plugin Traits**: [`SourceParser`], [`TargetParser`] and [`RecordWriter`]
//! - **Schema & Values**: [`Schema`], [`Column`], [`DataType`], [`Value`]
//! - **Configuration**: YAML-based pipeline definitions
//! - **Error Handling**: [`RecordError`] per record, [`PluginError`] per pass
//!
//! ## Example Usage
//!
//! ```rust
//! use dsv_core::{RecordDetail, RecordKind, SinkOutcome};
//!
//! // A sink that keeps the first data row and stops the pass.
//! let mut first = None;
//! let mut sink = |record: Vec<String>, detail: RecordDetail| {
//!     if detail.kind == RecordKind::Ok {
//!         first = Some(record);
//!         return SinkOutcome::Stop;
//!     }
//!     SinkOutcome::Continue
//! };
//! # let _ = &mut sink;
//! ```

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

pub mod error;
pub mod schema;
pub mod value;

pub use error::{PluginError, RecordError};
pub use schema::{Column, DataType, Schema};
pub use value::{ConversionError, Value};

/// A decoded input row: raw, untyped fields in input order.
///
/// Rows are not required to share a field count.
pub type RawRecord = Vec<String>;

/// Tag carried by every record delivered to a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Header row holding column names.
    ///
    /// Delivered at most once per pass, and only as the first record.
    Schema,

    /// A successfully decoded or encoded record.
    #[default]
    Ok,

    /// A record that failed somewhere along the way.
    ///
    /// Always carries at least one error and the best-effort payload.
    Failed,

    /// End-of-stream marker
    ///
    /// Delivered exactly once, last, with an empty payload.
    End,
}

/// Where a record was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderDetail {
    pub source: String,
}

impl ReaderDetail {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Where a record is being written to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterDetail {
    pub target: String,
}

impl WriterDetail {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// Metadata travelling with a record through the sink protocol.
#[derive(Debug, Default)]
pub struct RecordDetail {
    pub reader: ReaderDetail,
    pub writer: WriterDetail,
    pub kind: RecordKind,
    pub errors: Vec<RecordError>,

    /// 1-based input line the row started on, when known.
    pub line: Option<u64>,
}

impl RecordDetail {
    pub fn new(reader: ReaderDetail, kind: RecordKind) -> Self {
        Self {
            reader,
            kind,
            ..Self::default()
        }
    }

    /// Marks the record as failed and records why.
    pub fn fail(&mut self, error: RecordError) {
        self.kind = RecordKind::Failed;
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A sink's answer to a delivered record.
#[derive(Debug)]
pub enum SinkOutcome {
    /// Keep delivering records.
    Continue,

    /// End the pass now. Not an error: the pass returns [`PassOutcome::Stopped`].
    Stop,

    /// The sink failed; the pass ends with [`PluginError::Sink`].
    Error(anyhow::Error),
}

/// Consumer callback receiving one record at a time.
///
/// Any `FnMut(R, RecordDetail) -> SinkOutcome` closure is a sink.
pub trait RecordSink<R> {
    fn add_record(&mut self, record: R, detail: RecordDetail) -> SinkOutcome;
}

impl<R, F> RecordSink<R> for F
where
    F: FnMut(R, RecordDetail) -> SinkOutcome,
{
    fn add_record(&mut self, record: R, detail: RecordDetail) -> SinkOutcome {
        self(record, detail)
    }
}

/// How a pass ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The stream was exhausted (source) or the record was handled (target).
    Completed,

    /// A sink returned [`SinkOutcome::Stop`].
    Stopped,
}

/// Maps a sink answer onto the pass result.
///
/// `None` means the pass goes on.
pub fn check_outcome(outcome: SinkOutcome) -> Option<Result<PassOutcome, PluginError>> {
    match outcome {
        SinkOutcome::Continue => None,
        SinkOutcome::Stop => Some(Ok(PassOutcome::Stopped)),
        SinkOutcome::Error(e) => Some(Err(PluginError::Sink(e))),
    }
}

/// Role a plugin plays in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    SourceParser,
    TargetParser,
}

/// Static plugin identity, queried by a host to register the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginDetail {
    pub name: &'static str,
    pub kind: PluginKind,
}

/// Base trait for all parser plugins
pub trait Plugin {
    /// Returns the fixed identity of this plugin
    fn plugin_detail(&self) -> PluginDetail;
}

/// Trait for source parsers
///
/// Source parsers decode an input stream into raw records and push them to a
/// sink. The stream is owned by the caller and is never closed by the parser.
pub trait SourceParser: Plugin {
    /// Run one pass over `reader`
    ///
    /// Every row is delivered to `sink` in input order, followed by a single
    /// [`RecordKind::End`] record. A decode failure produces a
    /// [`RecordKind::Failed`] record and the pass goes on.
    ///
    /// # Returns
    /// [`PassOutcome::Stopped`] when the sink asked to stop, otherwise
    /// [`PassOutcome::Completed`]
    fn get_record(
        &self,
        reader: &mut dyn Read,
        reader_detail: &ReaderDetail,
        sink: &mut dyn RecordSink<RawRecord>,
    ) -> Result<PassOutcome, PluginError>;

    /// Returns the schema of the records this parser produces
    ///
    /// May consume part of `reader` when the schema has to be inferred.
    fn get_schema(&self, reader: &mut dyn Read, reader_detail: &ReaderDetail) -> Result<Schema, PluginError>;
}

/// Trait for target parsers
pub trait TargetParser: Plugin {
    /// Projects `schema` onto what this format can represent
    fn convert_schema(&self, schema: &Schema) -> Schema;

    /// Opens a pass over `out`
    ///
    /// The returned writer may buffer; rows are durable once
    /// [`RecordWriter::finish`] returns or the writer is dropped.
    fn writer<'w>(&self, out: &'w mut dyn Write) -> Box<dyn RecordWriter + 'w>;
}

/// Pass-scoped writer opened by a [`TargetParser`].
pub trait RecordWriter {
    /// Encode one record
    ///
    /// A record that cannot be coerced or encoded is marked
    /// [`RecordKind::Failed`] and handed to `error_sink` instead of the
    /// stream. Successful records never reach `error_sink`.
    fn put_record(
        &mut self,
        writer_detail: &WriterDetail,
        record: Value,
        detail: RecordDetail,
        schema: &Schema,
        error_sink: &mut dyn RecordSink<Value>,
    ) -> Result<PassOutcome, PluginError>;

    /// Flush buffered rows and end the pass
    fn finish(self: Box<Self>) -> Result<(), PluginError>;
}

/// Checks a configured delimiter and returns it as a byte.
///
/// The delimiter must be a single ASCII character that is not a quote or a
/// line terminator.
pub fn delimiter_byte(delimiter: char) -> Result<u8, PluginError> {
    match delimiter {
        '"' | '\r' | '\n' => Err(PluginError::InvalidConfig(format!(
            "delimiter {delimiter:?} is reserved"
        ))),
        c if c.is_ascii() => Ok(c as u8),
        c => Err(PluginError::InvalidConfig(format!(
            "delimiter {c:?} must be a single ASCII character"
        ))),
    }
}

/// Configuration for the CSV source parser
///
/// Immutable once a parser is built; an inferred schema is returned to the
/// caller instead of being stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvSourceSpec {
    /// Field delimiter. Default: `,`
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Whether the first row of a pass holds column names
    #[serde(default)]
    pub has_header: bool,

    /// Derive the schema from the first row when none is given
    ///
    /// Column names come from the header if present, else `col_0`, `col_1`, …
    #[serde(default)]
    pub infer_schema: bool,

    /// Explicit schema; takes precedence over inference
    #[serde(default)]
    pub schema: Option<Schema>,
}

impl Default for CsvSourceSpec {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            has_header: false,
            infer_schema: false,
            schema: None,
        }
    }
}

/// Configuration for the CSV target parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvTargetSpec {
    /// Field delimiter. Default: `,`
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Emit the column names once before the first row of each pass
    #[serde(default)]
    pub write_header: bool,
}

impl Default for CsvTargetSpec {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            write_header: false,
        }
    }
}

fn default_delimiter() -> char {
    ','
}

/// Complete pipeline definition loaded from YAML configuration
///
/// # Example YAML Configuration
///
/// ```yaml
/// name: "orders"
/// source:
///   type: file_csv
///   id: "orders-in"
///   path: "data/*.csv"
///   has_header: true
///   infer_schema: true
/// target:
///   type: file_csv
///   id: "orders-out"
///   path: "out/orders.tsv"
///   delimiter: "\t"
///   write_header: true
/// rejects: "out/rejects.jsonl"
/// max_rejects: 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Human-readable name of the pipeline
    pub name: String,

    pub source: SourceSpec,

    pub target: TargetSpec,

    /// File receiving failed records as JSON lines
    ///
    /// Failed records are only logged when unset.
    #[serde(default)]
    pub rejects: Option<String>,

    /// Stop the run once more than this many records were rejected
    #[serde(default)]
    pub max_rejects: Option<usize>,
}

impl PipelineSpec {
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceSpec {
    #[serde(rename = "file_csv")]
    Csv(CsvFileSourceSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TargetSpec {
    #[serde(rename = "file_csv")]
    Csv(CsvFileTargetSpec),
}

/// CSV files read by a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvFileSourceSpec {
    /// Unique identifier for this source
    pub id: String,

    /// File path or glob pattern
    ///
    /// Examples: "data.csv", "data/*.csv"
    pub path: String,

    #[serde(flatten)]
    pub parser: CsvSourceSpec,
}

/// CSV file written by a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvFileTargetSpec {
    /// Unique identifier for this target
    pub id: String,

    /// Output file; standard output when absent
    #[serde(default)]
    pub path: Option<String>,

    #[serde(flatten)]
    pub parser: CsvTargetSpec,
}
