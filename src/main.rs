use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use svcmain::{LifecycleConfig, StopWaiter};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "svcmain")]
#[command(about = "Run a worker interactively or as a managed service with coordinated shutdown")]
#[command(version)]
#[command(long_about = "Runs a heartbeat worker until it is asked to stop. Launched by systemd it \
reports its status through sd_notify and answers stop requests and watchdog checks; from a \
terminal it stops on SIGINT or SIGTERM. With --svc it installs, removes, starts, stops, pauses \
or continues its own systemd unit instead.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, help = "Path to TOML configuration file")]
    config: Option<String>,

    /// Administrative command
    #[arg(
        long,
        value_name = "COMMAND",
        help = "One of install, remove, debug, start, stop, pause or continue"
    )]
    svc: Option<String>,

    /// Heartbeat interval of the demo worker
    #[arg(long, default_value_t = 1000, help = "Milliseconds between worker heartbeats")]
    interval_ms: u64,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit without running the worker")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH", help = "Append log output to this file")]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting svcmain v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => LifecycleConfig::load_from_file(path),
        None => LifecycleConfig::load(),
    }
    .map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        drop(log_guard);
        std::process::exit(svcmain::EXIT_ADMIN_FAILURE);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    if args.svc.is_some() {
        config.service.command = args.svc.clone();
    }

    let interval = Duration::from_millis(args.interval_ms.max(1));
    let exit_code = match svcmain::run(move |stop| heartbeat(stop, interval), &config).await {
        Ok(launch) => {
            info!("svcmain finished: {:?}", launch);
            launch.exit_code()
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            if e.wants_usage() {
                eprint!("{}", svcmain::usage(&program_name()));
            }
            e.exit_code()
        }
    };

    drop(log_guard);
    std::process::exit(exit_code);
}

/// Demo worker: logs a heartbeat until asked to stop.
fn heartbeat(stop: StopWaiter, interval: Duration) -> Result<()> {
    let mut beats: u64 = 0;
    while !stop.wait_timeout(interval) {
        beats += 1;
        info!(beats, "heartbeat");
    }
    info!("Worker stopping after {} heartbeats", beats);
    Ok(())
}

fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .and_then(|p| Path::new(p).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "svcmain".to_string())
}

fn init_logging(args: &Args) -> Result<WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("svcmain={}", log_level)));

    let (writer, guard) = match &args.log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log file {} has no file name", path.display()))?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    let ansi = args.log_file.is_none();

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_names(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .with_thread_names(args.debug)
                .boxed()
        }
        None => fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_names(args.debug)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# svcmain Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Every key can be overridden with SVCMAIN_<SECTION>__<KEY>, e.g. SVCMAIN_ADMIN__TIMEOUT_MS");
    println!();
    println!("{}", toml::to_string_pretty(&LifecycleConfig::default())?);
    Ok(())
}
