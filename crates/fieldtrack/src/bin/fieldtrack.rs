//! fieldtrack CLI: replay a recorded session through the pipeline, or manage
//! configuration files.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use fieldtrack::events::{BackgroundPublisher, WriterPublisher};
use fieldtrack::pipeline::{run_frames, Clock, SteppedClock, SystemClock};
use fieldtrack::replay::open_session;
use fieldtrack::{FieldTrackConfig, Pipeline, StartupError};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "fieldtrack")]
#[command(about = "Plane localization and goal/miss telemetry from a fixed camera")]
#[command(version)]
struct Cli {
    /// Log level when no FIELDTRACK_LOG is set (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit log events as JSON objects.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session; telemetry goes to stdout as `topic<TAB>json`.
    Run(RunArgs),

    /// Print the default configuration as JSON.
    DefaultConfig {
        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Load and validate a configuration file.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Session JSON listing frame images and their fiducial detections.
    #[arg(long)]
    session: PathBuf,

    /// Configuration JSON; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stamp frames at this fixed spacing instead of wall-clock time.
    #[arg(long)]
    frame_interval_ms: Option<u64>,

    /// Depth of the outgoing telemetry queue.
    #[arg(long, default_value_t = 64)]
    queue: usize,
}

fn init_logging(cli: &Cli) {
    let default = cli.log_level.parse().unwrap_or(log::LevelFilter::Info);
    #[cfg(feature = "tracing")]
    {
        use fieldtrack::core::LogFormat;
        let _ = tracing_log::LogTracer::init();
        let format = if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        };
        if let Err(err) = fieldtrack::core::init_tracing(default, format) {
            eprintln!("tracing subscriber not installed: {err}");
        }
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = fieldtrack::core::init_with_level(fieldtrack::core::level_from_env(default));
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Run(args) => run_session(&args),
        Commands::DefaultConfig { out } => run_default_config(out),
        Commands::CheckConfig { config } => run_check_config(config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<FieldTrackConfig, StartupError> {
    let Some(path) = path else {
        return Ok(FieldTrackConfig::default());
    };
    let cfg = FieldTrackConfig::load_json(path).map_err(|source| StartupError::Load {
        what: format!("config {}", path.display()),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

fn run_session(args: &RunArgs) -> CliResult<()> {
    let config = load_config(args.config.as_ref())?;
    let (mut source, detector) = open_session(&args.session)?;

    let sink = BackgroundPublisher::spawn(WriterPublisher::new(std::io::stdout()), args.queue)
        .map_err(|e| StartupError::Source(format!("telemetry worker: {e}")))?;
    let mut pipeline = Pipeline::new(&config, detector, sink)?;

    let clock: Box<dyn Clock> = match args.frame_interval_ms {
        Some(ms) => Box::new(SteppedClock::new(SystemClock.now(), ms as f64 / 1000.0)),
        None => Box::new(SystemClock),
    };
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(err) = ctrlc::set_handler(move || {
        log::info!("interrupt received, finishing current frame");
        flag.store(true, Ordering::Relaxed);
    }) {
        log::warn!("interrupt handler not installed: {err}");
    }
    let summary = run_frames(
        &mut pipeline,
        &mut source,
        clock.as_ref(),
        &config.source,
        &stop,
    );
    // joins the telemetry worker so every queued line is written
    drop(pipeline);

    eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_default_config(out: Option<PathBuf>) -> CliResult<()> {
    let cfg = FieldTrackConfig::default();
    match out {
        Some(path) => {
            cfg.write_json(&path)?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{}", cfg.to_json_pretty()?),
    }
    Ok(())
}

fn run_check_config(path: PathBuf) -> CliResult<()> {
    load_config(Some(&path))?;
    println!("{}: ok", path.display());
    Ok(())
}
