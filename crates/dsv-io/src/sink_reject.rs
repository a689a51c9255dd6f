use std::io::Write;

use anyhow::Context;
use dsv_core::{RecordDetail, RecordKind, SinkOutcome};
use serde::Serialize;
use tracing::warn;

/// One rejected record as written to the reject stream.
#[derive(Serialize)]
struct RejectLine<'a, R: Serialize> {
    source: &'a str,
    target: &'a str,
    line: Option<u64>,
    kind: RecordKind,
    record: &'a R,
    errors: Vec<String>,
}

/// Dead-letter sink for failed records.
///
/// Every [`RecordKind::Failed`] record is written to `out` as one JSON object
/// per line; any other kind is ignored. With a limit set, the sink asks the
/// pass to stop once more than `limit` records were rejected.
pub struct RejectSink<W: Write> {
    out: W,
    rejected: u64,
    limit: Option<u64>,
}

impl<W: Write> RejectSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            rejected: 0,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn reject<R: Serialize>(&mut self, record: &R, detail: &RecordDetail) -> SinkOutcome {
        if detail.kind != RecordKind::Failed {
            return SinkOutcome::Continue;
        }

        let errors: Vec<String> = detail.errors.iter().map(|e| e.to_string()).collect();
        warn!(
            source = %detail.reader.source,
            line = ?detail.line,
            errors = ?errors,
            "rejected record"
        );

        let entry = RejectLine {
            source: &detail.reader.source,
            target: &detail.writer.target,
            line: detail.line,
            kind: detail.kind,
            record,
            errors,
        };
        if let Err(e) = self.write_line(&entry) {
            return SinkOutcome::Error(e);
        }

        self.rejected += 1;
        match self.limit {
            Some(limit) if self.rejected > limit => SinkOutcome::Stop,
            _ => SinkOutcome::Continue,
        }
    }

    /// Adapts this sink to the closure form expected by parsers.
    pub fn sink<R: Serialize + 'static>(&mut self) -> impl FnMut(R, RecordDetail) -> SinkOutcome + '_ {
        move |record, detail| self.reject(&record, &detail)
    }

    pub fn finish(mut self) -> anyhow::Result<W> {
        self.out.flush().context("flush rejects")?;
        Ok(self.out)
    }

    fn write_line<R: Serialize>(&mut self, entry: &RejectLine<'_, R>) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.out, entry).context("encode reject")?;
        self.out.write_all(b"\n").context("write reject")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsv_core::{RawRecord, ReaderDetail, RecordError, Value};

    fn failed(line: u64) -> RecordDetail {
        let mut detail = RecordDetail::new(ReaderDetail::new("in.csv"), RecordKind::Ok);
        detail.line = Some(line);
        detail.fail(RecordError::Decode {
            line,
            message: "field 0: invalid utf-8".into(),
        });
        detail
    }

    #[test]
    fn writes_failed_records_as_json_lines() {
        let mut sink = RejectSink::new(Vec::new());
        let raw: RawRecord = vec!["a".into(), "\u{fffd}".into()];
        assert!(matches!(sink.reject(&raw, &failed(3)), SinkOutcome::Continue));
        assert!(matches!(
            sink.reject(&Value::from(vec![1, 2]), &failed(4)),
            SinkOutcome::Continue
        ));
        assert_eq!(sink.rejected(), 2);

        let out = String::from_utf8(sink.finish().unwrap()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["source"], "in.csv");
        assert_eq!(lines[0]["line"], 3);
        assert_eq!(lines[0]["kind"], "failed");
        assert_eq!(lines[0]["record"][0], "a");
        assert!(lines[0]["errors"][0]
            .as_str()
            .unwrap()
            .starts_with("malformed row at line 3"));
        assert_eq!(lines[1]["record"], serde_json::json!([1, 2]));
    }

    #[test]
    fn ignores_records_that_did_not_fail() {
        let mut sink = RejectSink::new(Vec::new());
        let detail = RecordDetail::new(ReaderDetail::new("in.csv"), RecordKind::Ok);
        assert!(matches!(sink.reject(&Value::Null, &detail), SinkOutcome::Continue));
        assert_eq!(sink.rejected(), 0);
        assert!(sink.finish().unwrap().is_empty());
    }

    #[test]
    fn stops_after_limit() {
        let mut sink = RejectSink::new(Vec::new()).with_limit(1);
        let raw: RawRecord = vec![];
        assert!(matches!(sink.reject(&raw, &failed(1)), SinkOutcome::Continue));
        assert!(matches!(sink.reject(&raw, &failed(2)), SinkOutcome::Stop));
    }

    #[test]
    fn closure_form_is_a_record_sink() {
        use dsv_core::RecordSink;

        let mut sink = RejectSink::new(Vec::new());
        {
            let mut as_sink = sink.sink::<RawRecord>();
            let outcome = as_sink.add_record(vec!["x".to_string()], failed(9));
            assert!(matches!(outcome, SinkOutcome::Continue));
        }
        assert_eq!(sink.rejected(), 1);
    }
}
