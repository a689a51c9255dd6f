use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dsv_core::{
    CsvFileSourceSpec, CsvFileTargetSpec, PassOutcome, PipelineSpec, RawRecord, ReaderDetail,
    RecordDetail, RecordKind, Schema, SinkOutcome, SourceParser, SourceSpec, TargetSpec, Value,
    WriterDetail,
};
use glob::glob;
use tracing::info;

use crate::sink_reject::RejectSink;
use crate::source_csv::CsvSourceParser;
use crate::target_csv::CsvTargetParser;

/// Counters collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub files: usize,
    /// Data rows delivered by the source, header rows excluded.
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_rejected: u64,
    /// A sink stopped the run before every input was read.
    pub stopped: bool,
}

/// Source files → CSV source parser → CSV target parser → output.
///
/// Failed records from either side go to a [`RejectSink`].
pub struct Pipeline {
    name: String,
    source_spec: CsvFileSourceSpec,
    target_spec: CsvFileTargetSpec,
    source: CsvSourceParser,
    target: CsvTargetParser,
    rejects: Option<PathBuf>,
    max_rejects: Option<u64>,
}

impl Pipeline {
    pub fn try_new(spec: PipelineSpec) -> Result<Self> {
        let SourceSpec::Csv(source_spec) = spec.source;
        let TargetSpec::Csv(target_spec) = spec.target;

        let source = CsvSourceParser::try_new(source_spec.parser.clone())
            .with_context(|| format!("source {}", source_spec.id))?;
        let target = CsvTargetParser::try_new(target_spec.parser.clone())
            .with_context(|| format!("target {}", target_spec.id))?;

        Ok(Self {
            name: spec.name,
            source_spec,
            target_spec,
            source,
            target,
            rejects: spec.rejects.map(PathBuf::from),
            max_rejects: spec.max_rejects.map(|n| n as u64),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expands the source path pattern, sorted.
    pub fn input_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in glob(&self.source_spec.path).context("glob")? {
            paths.push(entry?);
        }
        if paths.is_empty() {
            anyhow::bail!("no files matched: {}", self.source_spec.path);
        }
        paths.sort();
        Ok(paths)
    }

    /// Schema of the run: explicit, or inferred from the first input file.
    pub fn resolve_schema(&self) -> Result<Schema> {
        let paths = self.input_paths()?;
        self.schema_from(&paths[0])
    }

    fn schema_from(&self, path: &Path) -> Result<Schema> {
        let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let schema = self
            .source
            .get_schema(&mut file, &ReaderDetail::new(path.display().to_string()))
            .with_context(|| format!("schema of {}", path.display()))?;
        Ok(schema)
    }

    pub fn run(&self) -> Result<PipelineReport> {
        let paths = self.input_paths()?;
        let schema = self.schema_from(&paths[0])?;
        info!(
            pipeline = %self.name,
            files = paths.len(),
            columns = schema.len(),
            "starting pipeline"
        );

        let mut out: Box<dyn Write> = match &self.target_spec.path {
            Some(path) => Box::new(File::create(path).with_context(|| format!("create {path}"))?),
            None => Box::new(io::stdout().lock()),
        };
        let rejects_out: Box<dyn Write> = match &self.rejects {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("create {}", path.display()))?,
            )),
            None => Box::new(io::sink()),
        };
        let mut rejects = RejectSink::new(rejects_out);
        if let Some(limit) = self.max_rejects {
            rejects = rejects.with_limit(limit);
        }

        let writer_detail = WriterDetail::new(
            self.target_spec
                .path
                .clone()
                .unwrap_or_else(|| "stdout".to_string()),
        );
        let mut writer = self.target.open(&mut out);
        let mut report = PipelineReport::default();

        for path in &paths {
            let reader_detail = ReaderDetail::new(path.display().to_string());
            let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            info!(file = %path.display(), "reading");
            report.files += 1;

            let outcome = self
                .source
                .get_record(&mut file, &reader_detail, &mut |record: RawRecord, detail: RecordDetail| {
                    match detail.kind {
                        RecordKind::Schema | RecordKind::End => SinkOutcome::Continue,
                        RecordKind::Failed => {
                            report.rows_read += 1;
                            rejects.reject(&record, &detail)
                        }
                        RecordKind::Ok => {
                            report.rows_read += 1;
                            let result = writer.put_record(
                                &writer_detail,
                                Value::from_raw(record),
                                detail,
                                &schema,
                                &mut rejects.sink::<Value>(),
                            );
                            match result {
                                Ok(PassOutcome::Completed) => SinkOutcome::Continue,
                                Ok(PassOutcome::Stopped) => SinkOutcome::Stop,
                                Err(e) => SinkOutcome::Error(e.into()),
                            }
                        }
                    }
                })
                .with_context(|| format!("read {}", path.display()))?;

            if outcome == PassOutcome::Stopped {
                info!(file = %path.display(), "pipeline stopped early");
                report.stopped = true;
                break;
            }
        }

        report.rows_written = writer.rows();
        report.rows_rejected = rejects.rejected();
        writer.finish().context("flush output")?;
        rejects.finish()?;

        info!(
            pipeline = %self.name,
            files = report.files,
            rows_read = report.rows_read,
            rows_written = report.rows_written,
            rows_rejected = report.rows_rejected,
            stopped = report.stopped,
            "pipeline finished"
        );
        Ok(report)
    }
}
