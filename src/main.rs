//! Thermocouple Logger - Command Line Entry Point
//!
//! Reads thermocouple temperatures periodically and saves them to CSV.
//! Core functionality is provided by the `thermolog_rs` library crate.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thermolog_rs::{
    backend::{list_ports, Acquisition, MockOpener, RunEvent, SerialOpener, SourceOpener},
    config::{default_output_path, format_interval, RunConfig, Settings},
    FailureKind, RunStatus, Sample,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit code for rejected configuration
const EXIT_CONFIG: u8 = 2;

/// Exit code for source or sink failures
const EXIT_FAILURE: u8 = 1;

/// Read thermocouple temperatures periodically and save to CSV.
#[derive(Parser, Debug)]
#[command(name = "thermolog", version, about, long_about = None)]
struct Cli {
    /// Serial port, e.g. "COM3" or "/dev/ttyUSB0"
    #[arg(long, env = "THERMOLOG_PORT")]
    port: Option<String>,

    /// Serial baudrate [default: 9600]
    #[arg(long)]
    baudrate: Option<u32>,

    /// Sampling interval in seconds (e.g. 5) [default: 5.0]
    #[arg(long)]
    interval: Option<f64>,

    /// Number of samples to collect. 0 means run until Ctrl+C [default: 0]
    #[arg(long)]
    count: Option<u64>,

    /// CSV output path [default: ./thermocouple_YYYYmmdd_HHMMSS.csv]
    #[arg(long)]
    out: Option<PathBuf>,

    /// Append to an existing CSV instead of starting a new one
    #[arg(long)]
    append: bool,

    /// Channels per sample [default: 4]
    #[arg(long)]
    channels: Option<usize>,

    /// Query string written to the device before each read
    #[arg(long)]
    query: Option<String>,

    /// Serial read timeout in milliseconds [default: 2000]
    #[arg(long, value_name = "MS")]
    read_timeout: Option<u64>,

    /// Settings file (TOML) providing defaults for these options
    #[arg(short, long, env = "THERMOLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Use a simulated device instead of the serial port
    #[arg(long)]
    mock: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Also write logs to daily-rolling files in this directory
    #[arg(long, env = "THERMOLOG_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// How each sample is echoed to stdout
    #[arg(long, value_enum, default_value_t = EchoFormat::Text)]
    echo: EchoFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EchoFormat {
    /// `[timestamp] ch1=.. ch2=..`
    Text,
    /// One JSON object per line
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::resolve(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let log_dir = cli.log_dir.clone().or_else(|| settings.log_dir.clone());
    let _log_guard = init_tracing(log_dir);

    if cli.list_ports {
        return print_ports();
    }

    let config = match build_config(&cli, &settings) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(&cli, &settings, config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Install the tracing subscriber; the returned guard flushes the log file on drop
fn init_tracing(log_dir: Option<PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,thermolog_rs=debug"));
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "thermolog.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}

fn print_ports() -> ExitCode {
    match list_ports() {
        Ok(ports) if ports.is_empty() => {
            println!("No serial ports found.");
            ExitCode::SUCCESS
        }
        Ok(ports) => {
            for port in ports {
                println!("{}\t{}", port.name, port.kind);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Merge command line over settings (CLI > settings file > defaults)
fn build_config(cli: &Cli, settings: &Settings) -> thermolog_rs::Result<RunConfig> {
    let port = cli.port.clone().unwrap_or_else(|| settings.port.clone());
    let out = cli
        .out
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| settings.out.clone())
        .unwrap_or_else(default_output_path);
    let read_timeout_ms = cli.read_timeout.unwrap_or(settings.read_timeout_ms);

    RunConfig::builder(port, out)
        .baud_rate(cli.baudrate.unwrap_or(settings.baud_rate))
        .interval_secs(cli.interval.unwrap_or(settings.interval_secs))
        .sample_limit(cli.count.unwrap_or(settings.count))
        .append(cli.append || settings.append)
        .channels(cli.channels.unwrap_or(settings.channels))
        .read_timeout(Duration::from_millis(read_timeout_ms))
        .query(cli.query.clone().or_else(|| settings.query.clone()))
        .build()
}

fn run(cli: &Cli, settings: &Settings, config: RunConfig) -> anyhow::Result<ExitCode> {
    let opener: Arc<dyn SourceOpener> = if cli.mock {
        tracing::info!("Using simulated device");
        Arc::new(MockOpener::default().with_channels(config.channels()))
    } else {
        Arc::new(SerialOpener::new(
            config.read_timeout(),
            config.query().map(str::to_string),
        ))
    };

    let port = config.connection_target().to_string();
    let interval = format_interval(config.interval());
    let out_path = config.output_path().to_path_buf();
    let sample_limit = config.sample_limit();

    let interrupt = Interrupt::default();
    watch_ctrl_c(interrupt.clone())?;
    if interrupt.is_requested() {
        println!("Done. Samples written: 0");
        return Ok(ExitCode::SUCCESS);
    }

    let mut acquisition =
        Acquisition::new(opener).with_live_buffer_points(settings.live_buffer_points);
    acquisition
        .start(config)
        .context("failed to start acquisition")?;

    let mut forwarded = false;
    loop {
        if !forwarded {
            forwarded = interrupt.forward(&acquisition);
        }
        match acquisition.recv_timeout(Duration::from_millis(200)) {
            Some(event) => {
                if let RunEvent::StatusChanged {
                    status: RunStatus::Running,
                    ..
                } = event
                {
                    println!("Reading from {} every {}s -> {}", port, interval, out_path.display());
                    if sample_limit > 0 {
                        println!("Will collect {} samples.", sample_limit);
                    } else {
                        println!("Will run until Ctrl+C.");
                    }
                }
                handle_event(event, cli.echo);
            }
            None if !acquisition.is_running() => {
                for event in acquisition.drain() {
                    handle_event(event, cli.echo);
                }
                break;
            }
            None => {}
        }
    }

    let samples = acquisition
        .state()
        .map(|state| state.samples_emitted)
        .unwrap_or(0);
    let result = acquisition.wait();
    println!("Done. Samples written: {}", samples);

    match result {
        Ok(summary) => {
            if cli.echo == EchoFormat::Json {
                println!("{}", serde_json::to_string(&summary)?);
            }
            for report in summary.sink_reports.iter().filter(|r| r.failures > 0) {
                tracing::warn!(
                    "Sink '{}' had {} failures (last: {})",
                    report.name,
                    report.failures,
                    report.last_error.as_deref().unwrap_or("-")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.failure_kind() == FailureKind::Config => Ok(ExitCode::from(EXIT_CONFIG)),
        Err(_) => Ok(ExitCode::from(EXIT_FAILURE)),
    }
}

fn handle_event(event: RunEvent, echo: EchoFormat) {
    match event {
        RunEvent::Sample(sample) => echo_sample(&sample, echo),
        RunEvent::StatusChanged { status, message } => {
            tracing::debug!("Status {}: {}", status, message);
        }
        RunEvent::FatalError { kind, message } => {
            eprintln!("ERROR ({}): {}", kind, message);
        }
    }
}

fn echo_sample(sample: &Sample, echo: EchoFormat) {
    match echo {
        EchoFormat::Text => println!("{}", sample.summary_line()),
        EchoFormat::Json => match serde_json::to_string(sample) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to encode sample: {}", e),
        },
    }
}

/// Ctrl+C flag shared between the signal watcher and the event loop
///
/// The watcher runs before the run starts, so an interrupt during port
/// opening is remembered and forwarded as a stop once the run is live.
#[derive(Debug, Clone, Default)]
struct Interrupt {
    requested: Arc<AtomicBool>,
}

impl Interrupt {
    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Stop `acquisition` if an interrupt arrived; true once forwarded
    fn forward(&self, acquisition: &Acquisition) -> bool {
        if self.is_requested() {
            acquisition.stop();
            true
        } else {
            false
        }
    }
}

/// First Ctrl+C requests a cooperative stop, a second one exits immediately
fn watch_ctrl_c(interrupt: Interrupt) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::warn!("Ctrl+C handling unavailable: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                eprintln!("\nInterrupted by user (Ctrl+C).");
                interrupt.request();

                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Forced exit.");
                    std::process::exit(130);
                }
            });
        })
        .context("failed to spawn Ctrl+C watcher")?;
    Ok(())
}
