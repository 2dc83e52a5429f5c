//! Kiln monitor CLI.
//!
//! - `simulate`: run a profile against the simulated kiln, streaming viewer
//!   messages to stdout, then persist and dispatch the run
//! - `analyze`: report and plots for a stored run
//! - `resend`: deliver a stored run's report again
//! - `history`: list stored runs
//! - `config`: show the resolved configuration

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use km_common::Profile;
use km_core::config::{load_config, ConfigError, LoadedConfig, MonitorConfig};
use km_core::dispatch::{DispatchError, DispatchOutcome, ReportDispatcher};
use km_core::exit_codes::ExitCode;
use km_core::hub::{Observer, SendOutcome};
use km_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use km_core::monitor::Monitor;
use km_core::notify::parse_destinations;
use km_core::poller::PollerExit;
use km_core::simulator::SimulatedKiln;
use km_record::{write_atomic, RecordError, RecordStore};
use km_report::{render_plots, AnalysisEngine, PlotConfig};

/// Kiln monitor: record, analyze and report kiln firings
#[derive(Parser)]
#[command(name = "km")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides KILN_MONITOR_CONFIG and the XDG location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error, off
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format on stderr: human or jsonl
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fire a profile on the simulated kiln
    Simulate(SimulateArgs),

    /// Analyze a stored run record
    Analyze(AnalyzeArgs),

    /// Deliver the report for a stored run again
    Resend(ResendArgs),

    /// List stored runs, newest first
    History,

    /// Print the resolved configuration as TOML
    Config,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Profile JSON file
    #[arg(long)]
    profile: PathBuf,

    /// Comma separated report recipients
    #[arg(long, default_value = "")]
    mailto: String,

    /// Minutes into the schedule to start at
    #[arg(long, default_value_t = 0.0)]
    startat: f64,

    /// Override the simulation speedup
    #[arg(long)]
    speedup: Option<f64>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Run record JSON file
    record: PathBuf,

    /// Directory to write the SVG plots into
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ResendArgs {
    /// Run record JSON file
    record: PathBuf,

    /// Comma separated report recipients
    #[arg(long)]
    mailto: String,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let loaded = match load_config(cli.global.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => return config_error(&e).into(),
    };
    info!(source = %loaded.source, path = ?loaded.path, "configuration loaded");

    let exit_code = match &cli.command {
        Commands::Simulate(args) => run_simulate(&loaded.config, args),
        Commands::Analyze(args) => run_analyze(args),
        Commands::Resend(args) => run_resend(&loaded.config, args),
        Commands::History => run_history(&loaded.config),
        Commands::Config => run_config(&loaded),
    };
    exit_code.into()
}

fn config_error(e: &ConfigError) -> ExitCode {
    eprintln!("km: configuration error: {e}");
    match e {
        ConfigError::Io { .. } => ExitCode::IoError,
        _ => ExitCode::ConfigError,
    }
}

fn record_error(e: &RecordError) -> ExitCode {
    eprintln!("km: {e}");
    match e {
        RecordError::Io { .. } => ExitCode::IoError,
        _ => ExitCode::RecordError,
    }
}

fn dispatch_exit(e: &DispatchError) -> ExitCode {
    eprintln!("km: {e}");
    if let Some(path) = e.record_path() {
        eprintln!("km: run record kept at {}", path.display());
    }
    match e {
        DispatchError::Persistence(inner) => match inner {
            RecordError::Io { .. } => ExitCode::IoError,
            _ => ExitCode::RecordError,
        },
        DispatchError::Analysis { .. } => ExitCode::AnalysisFailed,
        DispatchError::Delivery { .. } => ExitCode::DeliveryFailed,
        DispatchError::Io { .. } => ExitCode::IoError,
    }
}

// ============================================================================
// simulate
// ============================================================================

/// Writes each viewer message to stdout as one line.
struct StdoutObserver;

impl Observer for StdoutObserver {
    fn send(&self, message: &str) -> SendOutcome {
        let mut out = std::io::stdout().lock();
        match writeln!(out, "{message}").and_then(|_| out.flush()) {
            Ok(()) => SendOutcome::Sent,
            Err(e) => SendOutcome::Failed(e.to_string()),
        }
    }

    fn label(&self) -> String {
        "stdout".to_string()
    }
}

fn run_simulate(config: &MonitorConfig, args: &SimulateArgs) -> ExitCode {
    let profile = match std::fs::read_to_string(&args.profile)
        .map_err(|e| e.to_string())
        .and_then(|text| Profile::from_json(&text).map_err(|e| e.to_string()))
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("km: cannot load profile {}: {e}", args.profile.display());
            return ExitCode::ArgsError;
        }
    };

    let mut sim = config.simulation.clone();
    if let Some(speedup) = args.speedup {
        if !(speedup.is_finite() && speedup > 0.0) {
            eprintln!("km: --speedup must be positive");
            return ExitCode::ArgsError;
        }
        sim.speedup = speedup;
    }
    if !(args.startat.is_finite() && args.startat >= 0.0) {
        eprintln!("km: --startat must be a non-negative number of minutes");
        return ExitCode::ArgsError;
    }

    let kiln = Arc::new(SimulatedKiln::new(sim.thermal, sim.time_step_secs, sim.speedup));
    let monitor = Monitor::new(
        config,
        kiln.clone(),
        kiln,
        ReportDispatcher::from_config(config),
    );

    let destinations = parse_destinations(&args.mailto);
    if let Err(e) = monitor.start_run(profile, args.startat, destinations) {
        eprintln!("km: {e}");
        return ExitCode::ArgsError;
    }
    let viewer: Arc<dyn Observer> = Arc::new(StdoutObserver);
    if let SendOutcome::Failed(reason) = monitor.attach_observer(&viewer) {
        warn!(reason = %reason, "stdout viewer not attached");
    }

    let handle = match monitor.spawn() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("km: {e}");
            return ExitCode::InternalError;
        }
    };

    let exit_code = loop {
        if let Some(report) = monitor.wait_for_dispatch(Duration::from_millis(200)) {
            break match report.result {
                Ok(DispatchOutcome::Archived(stored)) => {
                    info!(path = %stored.path.display(), "run archived");
                    ExitCode::Clean
                }
                Ok(DispatchOutcome::Delivered { stored, summary }) => {
                    info!(
                        path = %stored.path.display(),
                        recipients = summary.recipients,
                        transport = summary.transport,
                        "run reported"
                    );
                    ExitCode::Clean
                }
                Err(e) => dispatch_exit(&e),
            };
        }
        if handle.is_finished() {
            break ExitCode::SourceLost;
        }
    };

    handle.shutdown();
    match handle.join() {
        PollerExit::Shutdown => exit_code,
        PollerExit::Fatal(reason) => {
            error!(reason = %reason, "poller stopped");
            ExitCode::SourceLost
        }
    }
}

// ============================================================================
// analyze / resend / history / config
// ============================================================================

fn run_analyze(args: &AnalyzeArgs) -> ExitCode {
    let record = match RecordStore::load(&args.record) {
        Ok(r) => r,
        Err(e) => return record_error(&e),
    };
    let report = match AnalysisEngine::analyze_record(&record) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("km: analysis failed: {e}");
            return ExitCode::AnalysisFailed;
        }
    };
    match report.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("km: {e}");
            return ExitCode::InternalError;
        }
    }

    if let Some(out) = &args.out {
        let plots = match render_plots(&report, &record.started_at, &PlotConfig::default()) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("km: plot rendering failed: {e}");
                return ExitCode::AnalysisFailed;
            }
        };
        let key = record_stem(&args.record).unwrap_or_else(|| record.key());
        for plot in &plots {
            let path = out.join(format!("{key}-{}", plot.filename()));
            if let Err(e) = write_atomic(&path, plot.svg.as_bytes()) {
                return record_error(&e);
            }
            info!(path = %path.display(), "plot written");
        }
    }
    ExitCode::Clean
}

fn record_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

fn run_resend(config: &MonitorConfig, args: &ResendArgs) -> ExitCode {
    let destinations = parse_destinations(&args.mailto);
    if destinations.is_empty() {
        eprintln!("km: --mailto names no recipients");
        return ExitCode::ArgsError;
    }
    let dispatcher = ReportDispatcher::from_config(config).with_artifacts(false);
    match dispatcher.resend(&args.record, &destinations) {
        Ok(summary) => {
            info!(
                recipients = summary.recipients,
                transport = summary.transport,
                "report resent"
            );
            ExitCode::Clean
        }
        Err(e) => dispatch_exit(&e),
    }
}

fn run_history(config: &MonitorConfig) -> ExitCode {
    let store = RecordStore::new(&config.storage_dir);
    let entries = match store.list() {
        Ok(entries) => entries,
        Err(e) => return record_error(&e),
    };
    match serde_json::to_string_pretty(&entries) {
        Ok(json) => {
            println!("{json}");
            ExitCode::Clean
        }
        Err(e) => {
            eprintln!("km: {e}");
            ExitCode::InternalError
        }
    }
}

fn run_config(loaded: &LoadedConfig) -> ExitCode {
    match loaded.config.to_toml_string() {
        Ok(text) => {
            print!("{text}");
            ExitCode::Clean
        }
        Err(e) => config_error(&e),
    }
}
