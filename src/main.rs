use anyhow::Context;
use clap::Parser;
use ecg_context::config::{Args, Command, SourceFormat};
use ecg_context::context::ContextExtractor;
use ecg_context::data_loading::{CsvDirSource, JsonDirSource, RecordSource};
use ecg_context::heart_analysis;
use log::{debug, info};
use serde::Serialize;
use serde_json::json;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();
    let config = args.context_config();
    debug!("Thresholds: {:?}", config);

    let source: Box<dyn RecordSource> = match args.format {
        SourceFormat::Json => Box::new(JsonDirSource::new(args.data_dir.clone())),
        SourceFormat::CsvDir => Box::new(CsvDirSource::new(args.data_dir.clone(), args.fs)),
    };
    info!("Reading records from {}", args.data_dir.display());

    let extractor = ContextExtractor::new(source, config).context("Invalid thresholds")?;

    match &args.command {
        Command::Context { record_id } => {
            let context = extractor
                .extract_patient_context(record_id)
                .with_context(|| format!("Failed to extract context for record {}", record_id))?;
            print_json(&context)?;
        }
        Command::Episodes { record_id, run_gap } => {
            let report = extractor
                .episodes(record_id)
                .with_context(|| format!("Failed to detect episodes for record {}", record_id))?;
            match run_gap {
                Some(gap) => {
                    let runs = heart_analysis::coalesce_runs(&report.episodes, *gap);
                    print_json(&json!({ "report": report, "runs": runs }))?;
                }
                None => print_json(&report)?,
            }
        }
        Command::Segment {
            record_id,
            start,
            duration,
        } => {
            let segment = extractor
                .extract_ecg_segment(record_id, *start, *duration)
                .with_context(|| format!("Failed to extract segment of record {}", record_id))?;
            print_json(&segment)?;
        }
        Command::Batch { record_ids } => {
            let results: Vec<_> = extractor
                .batch_extract(record_ids)
                .into_iter()
                .map(|(record_id, result)| match result {
                    Ok(context) => json!({ "record_id": record_id, "context": context }),
                    Err(e) => json!({ "record_id": record_id, "error": e.to_string() }),
                })
                .collect();
            print_json(&json!({ "total_analyzed": results.len(), "results": results }))?;
        }
        Command::Records => {
            let known = extractor.bradycardia_records();
            let available = extractor
                .available_records()
                .context("Failed to list records")?;
            print_json(&json!({
                "bradycardia_records": known,
                "available_records": available,
            }))?;
        }
    }

    Ok(())
}
