use std::io::Read;

use dsv_core::{
    check_outcome, delimiter_byte, CsvSourceSpec, PassOutcome, Plugin, PluginDetail, PluginError,
    PluginKind, RawRecord, ReaderDetail, RecordDetail, RecordError, RecordKind, RecordSink, Schema,
    SinkOutcome, SourceParser,
};
use tracing::debug;

pub const SOURCE_PARSER_NAME: &str = "csv_source_parser";

/// Reads delimited text one row at a time.
///
/// Rows may have any number of fields; nothing is rejected for arity here.
/// Coercion against a schema happens downstream.
#[derive(Debug, Clone)]
pub struct CsvSourceParser {
    spec: CsvSourceSpec,
    delimiter: u8,
}

impl CsvSourceParser {
    pub fn try_new(spec: CsvSourceSpec) -> Result<Self, PluginError> {
        let delimiter = delimiter_byte(spec.delimiter)?;
        Ok(Self { spec, delimiter })
    }

    /// Returns a parser that reports `schema` instead of inferring one.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.spec.schema = Some(schema);
        self
    }

    pub fn spec(&self) -> &CsvSourceSpec {
        &self.spec
    }

    fn csv_reader<'r>(&self, input: &'r mut dyn Read) -> csv::Reader<&'r mut dyn Read> {
        csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(input)
    }
}

impl Default for CsvSourceParser {
    fn default() -> Self {
        Self {
            spec: CsvSourceSpec::default(),
            delimiter: b',',
        }
    }
}

impl Plugin for CsvSourceParser {
    fn plugin_detail(&self) -> PluginDetail {
        PluginDetail {
            name: SOURCE_PARSER_NAME,
            kind: PluginKind::SourceParser,
        }
    }
}

impl SourceParser for CsvSourceParser {
    fn get_record(
        &self,
        reader: &mut dyn Read,
        reader_detail: &ReaderDetail,
        sink: &mut dyn RecordSink<RawRecord>,
    ) -> Result<PassOutcome, PluginError> {
        let mut csv_reader = self.csv_reader(reader);
        let mut row = csv::ByteRecord::new();
        let mut header_pending = self.spec.has_header;
        let mut rows = 0u64;

        debug!(source = %reader_detail.source, has_header = self.spec.has_header, "csv pass started");

        loop {
            let mut detail = RecordDetail::new(reader_detail.clone(), RecordKind::Ok);

            let record = match csv_reader.read_byte_record(&mut row) {
                Ok(false) => {
                    detail.kind = RecordKind::End;
                    let outcome = check_outcome(sink.add_record(Vec::new(), detail));
                    debug!(source = %reader_detail.source, rows, "csv pass finished");
                    return outcome.unwrap_or(Ok(PassOutcome::Completed));
                }
                Ok(true) => {
                    detail.line = row.position().map(|p| p.line());
                    decode_row(&row, &mut detail)
                }
                // Byte records with flexible arity only fail on I/O; invalid
                // UTF-8 in `decode_row` is the only source of `Decode`.
                Err(e) => return Err(PluginError::Read(e)),
            };

            // The first row owns the header slot, even when it failed to decode.
            if header_pending {
                header_pending = false;
                if detail.kind == RecordKind::Ok {
                    detail.kind = RecordKind::Schema;
                }
            }

            rows += 1;
            if let Some(result) = check_outcome(sink.add_record(record, detail)) {
                debug!(source = %reader_detail.source, rows, "csv pass ended by sink");
                return result;
            }
        }
    }

    fn get_schema(&self, reader: &mut dyn Read, reader_detail: &ReaderDetail) -> Result<Schema, PluginError> {
        if let Some(schema) = &self.spec.schema {
            return Ok(schema.clone());
        }
        if !self.spec.infer_schema {
            return Err(PluginError::SchemaInference {
                plugin: SOURCE_PARSER_NAME,
            });
        }

        let mut first: Option<(RawRecord, RecordKind)> = None;
        self.get_record(reader, reader_detail, &mut |record: RawRecord, detail: RecordDetail| {
            first = Some((record, detail.kind));
            SinkOutcome::Stop
        })?;

        let schema = match first {
            Some((names, RecordKind::Schema)) => Schema::from_names(names),
            Some((fields, _)) => Schema::from_names((0..fields.len()).map(|i| format!("col_{i}"))),
            None => Schema::default(),
        };
        debug!(source = %reader_detail.source, columns = schema.len(), "inferred schema");
        Ok(schema)
    }
}

/// Decodes every field as UTF-8.
///
/// Invalid fields fail the record but are still delivered, lossily decoded.
fn decode_row(row: &csv::ByteRecord, detail: &mut RecordDetail) -> RawRecord {
    let mut fields = Vec::with_capacity(row.len());
    for (index, field) in row.iter().enumerate() {
        match std::str::from_utf8(field) {
            Ok(text) => fields.push(text.to_owned()),
            Err(e) => {
                detail.fail(RecordError::Decode {
                    line: detail.line.unwrap_or_default(),
                    message: format!("field {index}: {e}"),
                });
                fields.push(String::from_utf8_lossy(field).into_owned());
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsv_core::DataType;
    use std::io;

    fn parser(has_header: bool, infer_schema: bool) -> CsvSourceParser {
        CsvSourceParser::try_new(CsvSourceSpec {
            has_header,
            infer_schema,
            ..CsvSourceSpec::default()
        })
        .unwrap()
    }

    fn row(fields: &[&str]) -> RawRecord {
        fields.iter().map(|f| f.to_string()).collect()
    }

    fn memory() -> ReaderDetail {
        ReaderDetail::new("memory")
    }

    /// Runs a full pass and returns every delivered (record, kind) pair.
    fn collect(parser: &CsvSourceParser, input: &[u8]) -> Vec<(RawRecord, RecordKind)> {
        let mut delivered = Vec::new();
        let mut input = input;
        let outcome = parser
            .get_record(&mut input, &memory(), &mut |record: RawRecord, detail: RecordDetail| {
                delivered.push((record, detail.kind));
                SinkOutcome::Continue
            })
            .unwrap();
        assert_eq!(outcome, PassOutcome::Completed);
        delivered
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk gone"))
        }
    }

    #[test]
    fn header_row_is_tagged_schema() {
        let delivered = collect(&parser(true, true), b"a,b,c\n1,2,3");
        assert_eq!(
            delivered,
            vec![
                (row(&["a", "b", "c"]), RecordKind::Schema),
                (row(&["1", "2", "3"]), RecordKind::Ok),
                (RawRecord::new(), RecordKind::End),
            ]
        );
    }

    #[test]
    fn without_header_every_row_is_ok() {
        let delivered = collect(&parser(false, true), b"1,2,3");
        let kinds: Vec<_> = delivered.iter().map(|(_, k)| *k).collect();
        assert_eq!(kinds, vec![RecordKind::Ok, RecordKind::End]);
    }

    #[test]
    fn end_is_delivered_once_and_last() {
        for input in [&b""[..], &b"x"[..], &b"a,b\n1,2\n3,4\n"[..], &b"h\n"[..]] {
            for has_header in [false, true] {
                let delivered = collect(&parser(has_header, false), input);
                let ends = delivered.iter().filter(|(_, k)| *k == RecordKind::End).count();
                assert_eq!(ends, 1, "input {input:?}");
                let (payload, kind) = delivered.last().unwrap();
                assert_eq!(*kind, RecordKind::End);
                assert!(payload.is_empty());
            }
        }
    }

    #[test]
    fn empty_input_with_header_yields_only_end() {
        let delivered = collect(&parser(true, false), b"");
        assert_eq!(delivered, vec![(RawRecord::new(), RecordKind::End)]);
    }

    #[test]
    fn rows_may_differ_in_arity() {
        let delivered = collect(&parser(false, false), b"1\n1,2,3\n1,2\n");
        let lens: Vec<_> = delivered.iter().map(|(r, _)| r.len()).collect();
        assert_eq!(lens, vec![1, 3, 2, 0]);
        assert!(delivered[..3].iter().all(|(_, k)| *k == RecordKind::Ok));
    }

    #[test]
    fn custom_delimiter_and_quoting() {
        let parser = CsvSourceParser::try_new(CsvSourceSpec {
            delimiter: ';',
            ..CsvSourceSpec::default()
        })
        .unwrap();
        let delivered = collect(&parser, b"\"a;b\";\"line\nbreak\";c\n");
        assert_eq!(delivered[0].0, vec!["a;b", "line\nbreak", "c"]);
    }

    #[test]
    fn invalid_utf8_fails_record_but_continues() {
        let mut details = Vec::new();
        let mut input: &[u8] = b"ok,1\nbad,\xff\xfe\nok,2\n";
        parser(false, false)
            .get_record(&mut input, &memory(), &mut |record: RawRecord, detail: RecordDetail| {
                details.push((record, detail));
                SinkOutcome::Continue
            })
            .unwrap();

        assert_eq!(details.len(), 4);
        let (payload, failed) = &details[1];
        assert_eq!(failed.kind, RecordKind::Failed);
        assert_eq!(failed.errors.len(), 1);
        assert!(matches!(failed.errors[0], RecordError::Decode { line: 2, .. }));
        assert_eq!(payload[0], "bad");
        assert_eq!(payload[1], "\u{fffd}\u{fffd}");
        assert_eq!(details[2].1.kind, RecordKind::Ok);
        assert_eq!(details[2].0, vec!["ok", "2"]);
    }

    #[test]
    fn failed_first_row_consumes_header_slot() {
        let delivered = collect(&parser(true, false), b"\xff,b\n1,2\n");
        let kinds: Vec<_> = delivered.iter().map(|(_, k)| *k).collect();
        assert_eq!(kinds, vec![RecordKind::Failed, RecordKind::Ok, RecordKind::End]);
    }

    #[test]
    fn records_carry_origin_and_line() {
        let mut lines = Vec::new();
        let mut input: &[u8] = b"a\n\"multi\nline\"\nb\n";
        parser(false, false)
            .get_record(&mut input, &memory(), &mut |_: RawRecord, detail: RecordDetail| {
                assert_eq!(detail.reader.source, "memory");
                if detail.kind != RecordKind::End {
                    lines.push(detail.line.unwrap());
                }
                SinkOutcome::Continue
            })
            .unwrap();
        assert_eq!(lines, vec![1, 2, 4]);
    }

    #[test]
    fn stop_ends_pass_immediately() {
        let mut seen = 0;
        let mut input: &[u8] = b"1\n2\n3\n";
        let outcome = parser(false, false)
            .get_record(&mut input, &memory(), &mut |_: RawRecord, _: RecordDetail| {
                seen += 1;
                if seen == 2 {
                    SinkOutcome::Stop
                } else {
                    SinkOutcome::Continue
                }
            })
            .unwrap();
        assert_eq!(outcome, PassOutcome::Stopped);
        assert_eq!(seen, 2);
    }

    #[test]
    fn sink_error_is_surfaced() {
        let mut seen = 0;
        let mut input: &[u8] = b"1\n2\n";
        let err = parser(false, false)
            .get_record(&mut input, &memory(), &mut |_: RawRecord, _: RecordDetail| {
                seen += 1;
                SinkOutcome::Error(anyhow::anyhow!("consumer full"))
            })
            .unwrap_err();
        assert!(matches!(err, PluginError::Sink(_)));
        assert!(err.to_string().contains("consumer full"));
        assert_eq!(seen, 1);
    }

    #[test]
    fn unreadable_stream_is_fatal() {
        let err = parser(false, false)
            .get_record(&mut BrokenReader, &memory(), &mut |_: RawRecord, _: RecordDetail| {
                SinkOutcome::Continue
            })
            .unwrap_err();
        assert!(matches!(err, PluginError::Read(_)));
    }

    #[test]
    fn infers_names_from_header() {
        let mut input: &[u8] = b"a,b,c\n1,2,3";
        let schema = parser(true, true).get_schema(&mut input, &memory()).unwrap();
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(schema.iter().all(|c| c.data_type == DataType::String));
    }

    #[test]
    fn infers_positional_names_without_header() {
        let mut input: &[u8] = b"1,2,3";
        let schema = parser(false, true).get_schema(&mut input, &memory()).unwrap();
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["col_0", "col_1", "col_2"]);
        assert!(schema.iter().all(|c| c.data_type == DataType::String));
    }

    #[test]
    fn inference_reads_only_first_row() {
        // A sink that saw the second row would have produced four columns.
        let mut input: &[u8] = b"1,2\n1,2,3,4\n";
        let schema = parser(false, true).get_schema(&mut input, &memory()).unwrap();
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn inference_on_empty_input_gives_empty_schema() {
        let mut input: &[u8] = b"";
        let schema = parser(true, true).get_schema(&mut input, &memory()).unwrap();
        assert!(schema.is_empty());
    }

    #[test]
    fn inference_disabled_without_schema_fails() {
        let mut input: &[u8] = b"a,b,c\n1,2,3";
        let err = parser(false, false).get_schema(&mut input, &memory()).unwrap_err();
        assert!(err.to_string().contains("schema cannot be inferred"), "{err}");
        assert!(err.to_string().contains(SOURCE_PARSER_NAME));
    }

    #[test]
    fn explicit_schema_skips_scan() {
        let explicit = Schema::new(vec![dsv_core::Column::new("id", DataType::Integer)]);
        let parser = parser(true, true).with_schema(explicit.clone());
        // never touches the stream
        let schema = parser.get_schema(&mut BrokenReader, &memory()).unwrap();
        assert_eq!(schema, explicit);
    }

    #[test]
    fn default_parser_matches_default_spec() {
        let parser = CsvSourceParser::default();
        assert_eq!(parser.spec(), &CsvSourceSpec::default());
        assert_eq!(parser.delimiter, b',');
    }

    #[test]
    fn rejects_unusable_delimiter() {
        let err = CsvSourceParser::try_new(CsvSourceSpec {
            delimiter: '\n',
            ..CsvSourceSpec::default()
        })
        .unwrap_err();
        assert!(matches!(err, PluginError::InvalidConfig(_)));
    }

    #[test]
    fn plugin_detail() {
        let detail = CsvSourceParser::default().plugin_detail();
        assert_eq!(detail.name, "csv_source_parser");
        assert_eq!(detail.kind, PluginKind::SourceParser);
    }
}
