//! Battery indicator for a serial LED matrix
//!
//! Polls the laptop battery ten times a second and draws it on a 9x34 LED
//! matrix: a battery outline, a fill level, and a dark pulse that rises while
//! charging and falls while discharging.
//!
//! ## Architecture
//! - **Render loop** (blocking thread): owns the serial port and pulse state
//! - **HTTP server** (tokio/axum, optional): read-only status and frame preview
//!
//! ## Usage
//! ```sh
//! battery-matrix run --serial-port /dev/ttyACM0 --http-port 8080
//! battery-matrix preview --percent 45 --output frame.png
//! ```

use battery_matrix::animator::Pulse;
use battery_matrix::frame::{MAX_SCALE, render, save_preview};
use battery_matrix::render::{DisplayStatus, LoopExit, render_loop};
use battery_matrix::server::{self, AppState};
use battery_matrix::telemetry::{POWER_SUPPLY_ROOT, SysfsBattery};
use battery_matrix::transport::{DryRun, Transport};
use battery_matrix::{DeviceConfig, setup_signal_handler, tick_interval};
use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Battery indicator for a serial LED matrix
#[derive(Parser)]
#[command(name = "battery-matrix")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the matrix until the battery goes away or Ctrl+C
    Run(RunArgs),
    /// Render a single frame to a PNG file
    Preview(PreviewArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Serial device the matrix is attached to
    #[arg(long, default_value = "/dev/ttyACM0")]
    serial_port: String,

    /// Serial baud rate
    #[arg(long, default_value = "115200")]
    baud: u32,

    /// Power-supply directory of the battery (default: first BAT* found)
    #[arg(long)]
    battery: Option<PathBuf>,

    /// Serve a read-only status API on this port
    #[arg(long)]
    http_port: Option<u16>,

    /// Render without opening the serial port
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct PreviewArgs {
    /// Battery percentage to draw (0-100)
    #[arg(long)]
    percent: f64,

    /// Row to centre the pulse on (omit for no pulse)
    #[arg(long)]
    pulse_center: Option<f64>,

    /// Pixels per LED (1-64)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=MAX_SCALE as i64))]
    scale: u32,

    /// Output PNG path
    #[arg(long, short)]
    output: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::Preview(args) => preview(&args),
    }
}

fn preview(args: &PreviewArgs) -> Result<(), Box<dyn Error>> {
    let pulse = Pulse {
        center: args.pulse_center,
        fade: if args.pulse_center.is_some() { 1.0 } else { 0.0 },
    };
    let grid = render(args.percent, &pulse);
    save_preview(&grid, args.scale, &args.output)?;
    tracing::info!(
        "Wrote {}% preview to {}",
        args.percent,
        args.output.display()
    );
    Ok(())
}

async fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    tracing::info!("Battery Matrix v{}", env!("CARGO_PKG_VERSION"));

    let telemetry = match &args.battery {
        Some(dir) => SysfsBattery::new(dir),
        None => SysfsBattery::discover(Path::new(POWER_SUPPLY_ROOT))
            .ok_or_else(|| format!("no battery found under {POWER_SUPPLY_ROOT}"))?,
    };
    tracing::info!("Battery: {}", telemetry.dir().display());

    let running = setup_signal_handler()?;
    let status = Arc::new(Mutex::new(DisplayStatus::new()));
    let device = DeviceConfig::new(args.serial_port, args.baud);

    let mut render_task = if args.dry_run {
        tracing::info!("Dry run: frames are rendered but not sent");
        spawn_loop(telemetry, DryRun::default(), status.clone(), running)
    } else {
        spawn_loop(telemetry, open_device(&device)?, status.clone(), running)
    };

    let exit = match args.http_port {
        Some(port) => {
            let app = server::create_router(AppState { status });
            let addr = format!("0.0.0.0:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Listening on http://{}", addr);
            tracing::info!("API Documentation: http://localhost:{}/docs", port);

            // The server has nothing to show once the loop is gone.
            tokio::select! {
                exit = &mut render_task => exit?,
                served = axum::serve(listener, app).into_future() => {
                    served?;
                    render_task.await?
                }
            }
        }
        None => render_task.await?,
    };

    match exit {
        LoopExit::NoBattery => tracing::info!("Battery no longer present, exiting"),
        LoopExit::Stopped => tracing::info!("Shutting down cleanly"),
    }
    Ok(())
}

fn spawn_loop<X>(
    telemetry: SysfsBattery,
    transport: X,
    status: Arc<Mutex<DisplayStatus>>,
    running: Arc<AtomicBool>,
) -> JoinHandle<LoopExit>
where
    X: Transport + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        render_loop(telemetry, transport, status, running, tick_interval())
    })
}

#[cfg(feature = "hardware")]
fn open_device(
    device: &DeviceConfig,
) -> Result<battery_matrix::transport::SerialTransport, Box<dyn Error>> {
    battery_matrix::transport::SerialTransport::open(device)
}

#[cfg(not(feature = "hardware"))]
fn open_device(device: &DeviceConfig) -> Result<DryRun, Box<dyn Error>> {
    Err(format!(
        "cannot open {}: built without the 'hardware' feature, use --dry-run",
        device.path
    )
    .into())
}
