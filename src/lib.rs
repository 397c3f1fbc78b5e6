//! Battery-charge indicator for a 9x34 serial LED matrix.
//!
//! The library is split into a pure core and the pieces that touch the
//! outside world:
//! - `animator`: pulse position/fade state machine
//! - `frame`: brightness-grid synthesis and the pulse attenuation overlay
//! - `encoder`: stage-column / flush wire commands
//! - `telemetry` and `transport`: battery readings in, bytes out
//! - `render` and `server`: the tick loop and its read-only HTTP view
//!
//! This module holds the shared geometry (`Grid`, dimension constants),
//! the serial device configuration, and the Ctrl+C helpers.

pub mod animator;
pub mod encoder;
pub mod frame;
pub mod render;
pub mod server;
pub mod telemetry;
pub mod transport;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ── Geometry ───────────────────────────────────────────────────────

/// Number of LED columns on the panel.
pub const WIDTH: usize = 9;
/// Number of LED rows on the panel.
pub const HEIGHT: usize = 34;
/// Brightness of a fully lit cell.
pub const MAX_BRIGHT: u8 = 255;
/// Nominal frame rate of the render loop.
pub const FPS: u32 = 10;

/// Time budget for one tick of the render loop.
pub const fn tick_interval() -> Duration {
    Duration::from_millis(1000 / FPS as u64)
}

/// A full frame of brightness values, addressed as `[column][row]`.
///
/// Row 0 is the top of the panel. The dimensions are fixed and every
/// write goes through [`Grid::set`], which clamps to `0..=255`.
///
/// # Rust concept: fixed-size arrays
/// `[[u8; HEIGHT]; WIDTH]` lives inline with no heap allocation, and the
/// sizes are part of the type, so a grid can never change shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    cells: [[u8; HEIGHT]; WIDTH],
}

impl Grid {
    /// An all-dark grid.
    pub fn new() -> Self {
        Self {
            cells: [[0; HEIGHT]; WIDTH],
        }
    }

    pub fn get(&self, col: usize, row: usize) -> u8 {
        self.cells[col][row]
    }

    /// Write a brightness value, clamping it into the valid range.
    pub fn set(&mut self, col: usize, row: usize, value: i32) {
        self.cells[col][row] = value.clamp(0, MAX_BRIGHT as i32) as u8;
    }

    /// All rows of one column, top to bottom.
    pub fn column(&self, col: usize) -> &[u8; HEIGHT] {
        &self.cells[col]
    }

    /// Columns left to right.
    pub fn columns(&self) -> impl Iterator<Item = &[u8; HEIGHT]> {
        self.cells.iter()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

// ── Device configuration ───────────────────────────────────────────

/// Where the matrix is attached and how fast to talk to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub path: String,
    pub baud: u32,
}

impl DeviceConfig {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        Self {
            path: path.into(),
            baud,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyACM0".to_string(),
            baud: 115_200,
        }
    }
}

// ── Shutdown signal ────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets the returned flag to false.
///
/// The render loop polls this between ticks so it can fall out of the loop
/// and drop (close) the serial port instead of dying mid-write.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Check if the main loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────
