//! # DSV I/O - Delimited-Text Parser Implementations
//!
//! This crate provides the concrete source and target parsers for delimited
//! text, plus the glue needed to run them end-to-end.
//!
//! ## Features
//!
//! ### Parsers
//! - **CSV source** (`csv_source_parser`): streams rows to a sink one at a time,
//!   tags the header row, infers a schema from the first row
//! - **CSV target** (`csv_target_parser`): coerces typed records against a
//!   schema and writes them as delimited rows through a buffered pass writer
//!
//! ### Sinks
//! - **Rejects**: dead-letter sink writing failed records as JSON lines
//!
//! ### Pipeline
//! - **Pipeline**: files matching a glob → source parser → target parser,
//!   driven by a YAML [`PipelineSpec`](dsv_core::PipelineSpec)
//!
//! ## Example Usage
//!
//! ```rust
//! use dsv_core::{CsvSourceSpec, ReaderDetail, RecordDetail, RecordKind, SinkOutcome, SourceParser};
//! use dsv_io::source_csv::CsvSourceParser;
//!
//! let parser = CsvSourceParser::try_new(CsvSourceSpec {
//!     has_header: true,
//!     ..CsvSourceSpec::default()
//! })?;
//!
//! let mut rows = Vec::new();
//! let mut input: &[u8] = b"id,name\n1,alice\n";
//! parser.get_record(&mut input, &ReaderDetail::new("memory"), &mut |record: Vec<String>, detail: RecordDetail| {
//!     if detail.kind == RecordKind::Ok {
//!         rows.push(record);
//!     }
//!     SinkOutcome::Continue
//! })?;
//! assert_eq!(rows, vec![vec!["1".to_string(), "alice".to_string()]]);
//! # Ok::<(), dsv_core::PluginError>(())
//! ```

/// Pipeline runner wiring source, target and rejects
pub mod pipeline;

/// Dead-letter sink for failed records
pub mod sink_reject;

/// CSV source parser
pub mod source_csv;

/// CSV target parser
pub mod target_csv;

pub use pipeline::{Pipeline, PipelineReport};
pub use sink_reject::RejectSink;
pub use source_csv::CsvSourceParser;
pub use target_csv::{CsvRecordWriter, CsvTargetParser};
