use crate::cli::args::{Cli, Commands};
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::readers::RemoteSource;
use crate::store::{ParquetStore, TabularStore};
use crate::utils::progress::ProgressReporter;
use crate::utils::CancelFlag;
use arrow::util::pretty::pretty_format_batches;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn, Level};

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let settings = Settings::load(cli.config.as_deref(), &cli.overrides())?;
    let silent = cli.log_file.is_some();

    let cancel = CancelFlag::new();
    watch_interrupt(cancel.clone());

    match cli.command {
        Commands::Fetch => {
            let source = RemoteSource::from_settings(&settings)?;
            let pipeline = Pipeline::from_settings(settings)?.with_cancel_flag(cancel);

            let progress = ProgressReporter::new_spinner("Downloading weather data...", silent);
            let report = pipeline.fetch_and_ingest(|| source.fetch()).await?;
            progress.finish_with_message(&format!(
                "Ingested {} rows (date_process {})",
                report.rows, report.date_process
            ));
        }

        Commands::Ingest { input } => {
            let payload = tokio::fs::read(&input).await.map_err(|e| {
                PipelineError::Decode(format!("could not read {}: {}", input.display(), e))
            })?;
            let pipeline = Pipeline::from_settings(settings)?.with_cancel_flag(cancel);

            let progress = ProgressReporter::new_spinner("Ingesting payload...", silent);
            let report = pipeline.ingest_payload(payload).await?;
            progress.finish_with_message(&format!(
                "Ingested {} rows (date_process {})",
                report.rows, report.date_process
            ));
        }

        Commands::Aggregate { .. } => {
            let pipeline = Pipeline::from_settings(settings)?.with_cancel_flag(cancel);

            let progress = ProgressReporter::new_spinner("Aggregating weather data...", silent);
            let report = pipeline.aggregate().await?;
            progress.finish_with_message(&format!(
                "Wrote {} aggregates from {} historical rows",
                report.groups.len(),
                report.historical_rows
            ));

            for group in report.groups.iter().filter(|g| g.output_rows == 0) {
                progress.println(&format!("No recent data for {}", group.key));
            }
        }

        Commands::Merge { .. } => {
            let pipeline = Pipeline::from_settings(settings)?.with_cancel_flag(cancel);

            let progress = ProgressReporter::new_spinner("Merging weather data...", silent);
            let report = pipeline.merge().await?;
            progress.finish_with_message(&format!(
                "Merged {} rows ({} without reference data)",
                report.merged_rows, report.unmatched_rows
            ));
        }

        Commands::Run => {
            let source = RemoteSource::from_settings(&settings)?;
            let pipeline = Pipeline::from_settings(settings)?.with_cancel_flag(cancel);

            let progress = ProgressReporter::new_spinner("Running pipeline...", silent);
            let report = pipeline.run(|| source.fetch()).await?;
            progress.finish_with_message("Pipeline complete");

            progress.println(&format!(
                "Ingested {} rows, wrote {} aggregates, merged {} rows",
                report.ingest.rows,
                report.aggregate.groups.len(),
                report.merge.merged_rows
            ));
        }

        Commands::Info { dataset, sample } => {
            let store = ParquetStore::new(settings.base_path());
            let info = store.describe(&dataset)?;
            println!("{}", info.summary());

            if sample > 0 {
                let table = store.read(&dataset)?;
                let shown = table.slice(0, sample.min(table.num_rows()));
                println!("\nSample rows (showing {}):", shown.num_rows());
                println!("{}", pretty_format_batches(&[shown])?);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                PipelineError::Config(format!("could not open log file {}: {}", path.display(), e))
            })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.try_init(),
    };

    installed.map_err(|e| PipelineError::Config(format!("could not install logger: {}", e)))
}

/// Ctrl-C stops the pipeline at the next stage checkpoint.
fn watch_interrupt(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next checkpoint");
            cancel.cancel();
        }
    });
    debug!("Interrupt handler installed");
}
