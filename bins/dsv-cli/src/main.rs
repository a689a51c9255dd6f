use anyhow::{Context, Result};
use clap::Parser;
use dsv_core::PipelineSpec;
use dsv_io::Pipeline;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
struct Args {
    /// Pipeline YAML
    #[arg(short, long)]
    pipeline: PathBuf,
    /// Print the resolved schema as YAML and exit
    #[arg(long)]
    schema_only: bool,
}

fn main() -> Result<()> {
    // stdout may carry the converted rows, keep logs on stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    let args = Args::parse();
    let spec: PipelineSpec = {
        let y = std::fs::read_to_string(&args.pipeline)
            .with_context(|| format!("read {}", args.pipeline.display()))?;
        PipelineSpec::from_yaml(&y)?
    };
    let pipeline = Pipeline::try_new(spec)?;

    if args.schema_only {
        let schema = pipeline.resolve_schema()?;
        print!("{}", serde_yaml::to_string(&schema)?);
        return Ok(());
    }

    let report = pipeline.run()?;
    info!(pipeline = pipeline.name(), ?report, "done");
    if report.rows_rejected > 0 {
        eprintln!(
            "{}: {} of {} rows rejected",
            pipeline.name(),
            report.rows_rejected,
            report.rows_read
        );
    }
    Ok(())
}
