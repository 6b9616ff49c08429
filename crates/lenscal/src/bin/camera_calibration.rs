use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lenscal::{
    open_source, run_calibration, CalibrationSettings, Calibrator, ConfigError, HeadlessSink,
    RunOptions,
};
use log::info;

/// Calibrate a camera from chessboard or circle-grid captures.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Settings file.
    #[arg(default_value = "default.json")]
    settings: PathBuf,

    /// Measured distance between the first and the last point of the first
    /// board row. Also refines the board layout during estimation.
    #[arg(short = 'd', long = "grid-width")]
    grid_width: Option<f32>,

    /// Half size of the corner refinement window.
    #[arg(long = "win-size", default_value_t = 11)]
    win_size: usize,

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

fn try_main(args: &Args) -> Result<(), ConfigError> {
    let settings = CalibrationSettings::load_json(&args.settings)?;
    let mut source = open_source(&settings.input)?;
    let options = RunOptions {
        grid_width: args.grid_width,
        subpix_half_window: args.win_size,
    };

    let summary = run_calibration(
        &settings,
        &options,
        &Calibrator::new(),
        source.as_mut(),
        &mut HeadlessSink::default(),
    );
    info!(
        "{} frames, {} accepted, {} estimation(s)",
        summary.frames, summary.accepted, summary.estimations
    );
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
