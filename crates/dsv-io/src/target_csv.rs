use std::io::{self, BufWriter, Write};

use dsv_core::value::{convert_record_to_strings, convert_to_record};
use dsv_core::{
    check_outcome, delimiter_byte, CsvTargetSpec, DataType, PassOutcome, Plugin, PluginDetail,
    PluginError, PluginKind, RecordDetail, RecordError, RecordSink, RecordWriter, Schema,
    TargetParser, Value, WriterDetail,
};
use tracing::debug;

pub const TARGET_PARSER_NAME: &str = "csv_target_parser";

/// Writes records as delimited text.
#[derive(Debug, Clone)]
pub struct CsvTargetParser {
    spec: CsvTargetSpec,
    delimiter: u8,
}

impl CsvTargetParser {
    pub fn try_new(spec: CsvTargetSpec) -> Result<Self, PluginError> {
        let delimiter = delimiter_byte(spec.delimiter)?;
        Ok(Self { spec, delimiter })
    }

    pub fn spec(&self) -> &CsvTargetSpec {
        &self.spec
    }

    /// Opens a buffered pass over `out`.
    ///
    /// `out` is typically `&mut W`, so the caller keeps ownership of the
    /// stream.
    pub fn open<W: Write>(&self, out: W) -> CsvRecordWriter<W> {
        let mut builder = csv::WriterBuilder::new();
        builder.delimiter(self.delimiter).flexible(true);
        let scratch = builder.from_writer(Vec::new());
        CsvRecordWriter {
            out: BufWriter::new(out),
            builder,
            scratch,
            header_pending: self.spec.write_header,
            rows: 0,
        }
    }
}

impl Default for CsvTargetParser {
    fn default() -> Self {
        Self {
            spec: CsvTargetSpec::default(),
            delimiter: b',',
        }
    }
}

/// Text carries no type information, so every column becomes a string.
pub fn convert_schema(schema: &Schema) -> Schema {
    schema.with_uniform_type(DataType::String)
}

impl Plugin for CsvTargetParser {
    fn plugin_detail(&self) -> PluginDetail {
        PluginDetail {
            name: TARGET_PARSER_NAME,
            kind: PluginKind::TargetParser,
        }
    }
}

impl TargetParser for CsvTargetParser {
    fn convert_schema(&self, schema: &Schema) -> Schema {
        convert_schema(schema)
    }

    fn writer<'w>(&self, out: &'w mut dyn Write) -> Box<dyn RecordWriter + 'w> {
        Box::new(self.open(out))
    }
}

/// One output pass.
///
/// Each row is encoded on its own and reaches the pass buffer whole or not at
/// all, so a failed record never leaves bytes behind. Rows are flushed once by
/// [`finish`](Self::finish). A writer dropped without `finish` still flushes
/// what it buffered, ignoring errors.
pub struct CsvRecordWriter<W: Write> {
    out: BufWriter<W>,
    builder: csv::WriterBuilder,
    scratch: csv::Writer<Vec<u8>>,
    header_pending: bool,
    rows: u64,
}

impl<W: Write> CsvRecordWriter<W> {
    /// Number of data rows encoded so far in this pass.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn put_record(
        &mut self,
        writer_detail: &WriterDetail,
        record: Value,
        mut detail: RecordDetail,
        schema: &Schema,
        error_sink: &mut dyn RecordSink<Value>,
    ) -> Result<PassOutcome, PluginError> {
        detail.writer = writer_detail.clone();

        match self.encode(&record, schema) {
            Ok(row) => match self.write_row(&row)? {
                Ok(()) => {
                    self.header_pending = false;
                    self.rows += 1;
                }
                Err(e) => detail.fail(RecordError::Encode(e.into())),
            },
            Err(e) => detail.fail(e),
        }

        if !detail.has_errors() {
            return Ok(PassOutcome::Completed);
        }
        check_outcome(error_sink.add_record(record, detail)).unwrap_or(Ok(PassOutcome::Completed))
    }

    /// Encodes the row, preceded by the header while it is pending.
    fn encode(&mut self, record: &Value, schema: &Schema) -> Result<Vec<u8>, RecordError> {
        let fields = convert_to_record(record, schema)?;
        let row = convert_record_to_strings(&fields)?;

        if self.header_pending {
            self.encode_fields(convert_schema(schema).names())?;
        }
        self.encode_fields(&row)?;
        let fresh = self.builder.from_writer(Vec::new());
        std::mem::replace(&mut self.scratch, fresh)
            .into_inner()
            .map_err(|e| RecordError::Encode(csv::Error::from(e.into_error())))
    }

    fn encode_fields<I, T>(&mut self, fields: I) -> Result<(), RecordError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let result = self
            .scratch
            .write_record(fields)
            .and_then(|()| self.scratch.flush().map_err(csv::Error::from));
        if let Err(e) = result {
            // A half-written record leaves state behind; start over.
            self.scratch = self.builder.from_writer(Vec::new());
            return Err(RecordError::Encode(e));
        }
        Ok(())
    }

    /// Copies an encoded row into the pass buffer.
    ///
    /// The inner result is a per-record failure: the stream refused the row
    /// before accepting any of it. A stream that fails after taking part of a
    /// row is torn, which ends the pass.
    fn write_row(&mut self, row: &[u8]) -> Result<io::Result<()>, PluginError> {
        let mut written = 0;
        while written < row.len() {
            match self.out.write(&row[written..]) {
                Ok(0) => return Err(PluginError::Write(io::ErrorKind::WriteZero.into())),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if written == 0 => return Ok(Err(e)),
                Err(e) => return Err(PluginError::Write(e)),
            }
        }
        Ok(Ok(()))
    }

    pub fn finish(mut self) -> Result<(), PluginError> {
        self.out.flush()?;
        debug!(rows = self.rows, "csv target pass finished");
        Ok(())
    }
}

impl<W: Write> RecordWriter for CsvRecordWriter<W> {
    fn put_record(
        &mut self,
        writer_detail: &WriterDetail,
        record: Value,
        detail: RecordDetail,
        schema: &Schema,
        error_sink: &mut dyn RecordSink<Value>,
    ) -> Result<PassOutcome, PluginError> {
        CsvRecordWriter::put_record(self, writer_detail, record, detail, schema, error_sink)
    }

    fn finish(self: Box<Self>) -> Result<(), PluginError> {
        CsvRecordWriter::finish(*self)
    }
}
