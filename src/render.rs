//! Render loop: owns the transport and the pulse state, one frame per tick.
//!
//! Each tick samples telemetry, advances the animation, renders a grid,
//! writes it out as nine stage commands plus a flush, publishes status for
//! the HTTP server, then sleeps out the remainder of the tick.
//!
//! Everything here runs on one thread. The only thing shared with other
//! threads is the `DisplayStatus` snapshot, which the loop writes and the
//! server reads.
//!
//! ## Rust concepts
//! - Generic functions over traits (`T: Telemetry`, `X: Transport`)
//! - Moving ownership into a function so `drop` closes the resource
//! - `loop` with `break value` to return why the loop ended
//! - `Arc<Mutex<T>>` for a snapshot shared with another thread

use crate::animator::{self, Mode, Pulse, PulseState};
use crate::encoder::frame_commands;
use crate::frame::render;
use crate::telemetry::{BatteryState, Reading, Telemetry};
use crate::transport::Transport;
use crate::{Grid, is_running};
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

// ── Engine ───────────────────────────────────────────────────────────

/// The deterministic part of a tick: pulse state in, frame out.
#[derive(Clone, Debug, Default)]
pub struct Engine {
    pulse: PulseState,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pulse_state(&self) -> PulseState {
        self.pulse
    }

    pub fn step(&mut self, battery: &BatteryState) -> (Pulse, Grid) {
        self.pulse = animator::update(self.pulse, battery);
        let pulse = self.pulse.visible();
        (pulse, render(battery.percent, &pulse))
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// Lifecycle of the render loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Starting,
    Running,
    /// Telemetry reported no battery installed
    NoBattery,
    /// Stopped by Ctrl+C
    Stopped,
}

/// Snapshot published after every tick.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct DisplayStatus {
    pub state: LoopState,
    /// Last battery reading used for rendering
    pub battery: BatteryState,
    pub mode: Mode,
    /// Pulse fade, 0-1
    pub fade: f64,
    /// Row the pulse is centred on, if visible
    pub pulse_center: Option<f64>,
    /// Why the last reading fell back to percent-only, if it did
    pub degraded: Option<String>,
    /// Frames fully written (nine columns and a flush)
    pub frames_sent: u64,
    /// Ticks dropped because a write failed
    pub transport_errors: u64,
    /// Server version
    pub version: String,
    /// Last rendered frame
    #[serde(skip)]
    pub frame: Grid,
}

impl DisplayStatus {
    pub fn new() -> Self {
        Self {
            state: LoopState::Starting,
            battery: BatteryState::default(),
            mode: Mode::Idle,
            fade: 0.0,
            pulse_center: None,
            degraded: None,
            frames_sent: 0,
            transport_errors: 0,
            version: env!("CARGO_PKG_VERSION").to_string(),
            frame: Grid::new(),
        }
    }

    fn record_tick(&mut self, reading: &Reading, pulse: Pulse, frame: Grid) {
        let battery = *reading.state();
        self.state = LoopState::Running;
        self.battery = battery;
        self.mode = battery.mode();
        self.fade = pulse.fade;
        self.pulse_center = pulse.center;
        self.degraded = reading.degraded_reason().map(str::to_string);
        self.frame = frame;
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock the shared status, shrugging off poisoning: it is only a snapshot.
pub fn lock_status(status: &Mutex<DisplayStatus>) -> MutexGuard<'_, DisplayStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Render loop ──────────────────────────────────────────────────────

/// Why the render loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    NoBattery,
    Stopped,
}

/// Write one frame. Stops at the first failed write so a partial frame is
/// never flushed.
pub fn send_frame<X: Transport>(
    transport: &mut X,
    grid: &Grid,
) -> Result<(), Box<dyn std::error::Error>> {
    for cmd in frame_commands(grid) {
        transport.send(&cmd)?;
    }
    Ok(())
}

/// Run until the battery disappears or `running` goes false.
///
/// The transport is moved in and dropped before returning, which closes the
/// device on every exit path.
pub fn render_loop<T, X>(
    mut telemetry: T,
    mut transport: X,
    status: Arc<Mutex<DisplayStatus>>,
    running: Arc<AtomicBool>,
    tick: Duration,
) -> LoopExit
where
    T: Telemetry,
    X: Transport,
{
    let mut engine = Engine::new();

    tracing::info!("Render loop started ({}ms per tick)", tick.as_millis());

    let exit = loop {
        if !is_running(&running) {
            tracing::info!("Render loop: stop requested");
            break LoopExit::Stopped;
        }

        let tick_start = Instant::now();

        let Some(reading) = telemetry.sample() else {
            tracing::info!("Render loop: no battery present, shutting down");
            break LoopExit::NoBattery;
        };
        if let Some(reason) = reading.degraded_reason() {
            tracing::warn!("Telemetry degraded, using percent only: {}", reason);
        }

        let (pulse, grid) = engine.step(reading.state());
        tracing::debug!(
            "percent={:.2} mode={:?} fade={:.2} pulse={:?}",
            reading.state().percent,
            reading.state().mode(),
            pulse.fade,
            pulse.center
        );

        let sent = send_frame(&mut transport, &grid);

        {
            let mut s = lock_status(&status);
            s.record_tick(&reading, pulse, grid);
            match &sent {
                Ok(()) => s.frames_sent += 1,
                Err(_) => s.transport_errors += 1,
            }
        }
        if let Err(e) = sent {
            tracing::error!("Frame write failed, skipping tick: {}", e);
        }

        let elapsed = tick_start.elapsed();
        if elapsed < tick {
            thread::sleep(tick - elapsed);
        } else if !tick.is_zero() {
            tracing::debug!(
                "Tick took {}ms (target: {}ms)",
                elapsed.as_millis(),
                tick.as_millis()
            );
        }
    };

    lock_status(&status).state = match exit {
        LoopExit::NoBattery => LoopState::NoBattery,
        LoopExit::Stopped => LoopState::Stopped,
    };

    tracing::info!("Releasing transport");
    drop(transport);
    exit
}
