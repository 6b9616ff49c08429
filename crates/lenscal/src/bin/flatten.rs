use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lenscal::{FlattenError, FlattenPipeline, FlattenSettings};
use log::info;

/// Remove lens distortion from an image list or a Y4M video.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Settings file.
    #[arg(default_value = "flatten.json")]
    settings: PathBuf,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = lenscal::core::verbosity_level(verbose);
    #[cfg(feature = "tracing")]
    lenscal::core::init_tracing_with_level(false, level);
    #[cfg(not(feature = "tracing"))]
    {
        if let Err(err) = lenscal::core::init_with_level(level) {
            eprintln!("logger: {err}");
        }
    }
}

fn try_main(args: &Args) -> Result<(), FlattenError> {
    let settings = FlattenSettings::load_json(&args.settings)?;
    let pipeline = FlattenPipeline::new(&settings)?;
    let summary = pipeline.run(&settings.input)?;
    info!(
        "{} frames read, {} written, {} skipped",
        summary.frames, summary.written, summary.skipped
    );
    if let Some(path) = summary.output {
        info!("output: {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match try_main(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
