#![deny(missing_docs)]

//! Entry point for the keygram batch pipeline.

use std::path::Path;
use std::process::ExitCode;

use keygram::acquire::MediaAcquirer;
use keygram::config::{CONFIG_FILE_NAME, PipelineConfig};
use keygram::logging;
use keygram::pipeline::{Pipeline, StdinPrompt};

fn main() -> ExitCode {
    let config = match PipelineConfig::load_or_default(Path::new(CONFIG_FILE_NAME)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init(&config.log_dir) {
        eprintln!("Logging disabled: {err}");
    }

    let acquirer = match MediaAcquirer::new(&config.transient_dir) {
        Ok(acquirer) => acquirer,
        Err(err) => {
            tracing::error!(
                dir = %config.transient_dir.display(),
                "Failed to prepare transient directory: {err}"
            );
            return ExitCode::FAILURE;
        }
    };

    let mut pipeline = Pipeline::new(config, acquirer, StdinPrompt);
    match pipeline.run() {
        Ok(summary) => {
            println!(
                "Batch finished: {} processed, {} failed, {} still pending.",
                summary.processed, summary.failed, summary.remaining
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("Batch aborted: {err}");
            ExitCode::FAILURE
        }
    }
}
