//! Frame synthesis: battery percentage + pulse in, brightness grid out.
//!
//! The panel is drawn as a battery outline: a 3-wide cap on row 0, a top
//! border on row 1, side borders on columns 0 and 8, and a bottom border on
//! row 33. The fill occupies columns 2..=6 and grows upward from row 32.
//! One row at the fill boundary lights up from the centre column outward as
//! the fractional part of the fill level grows.
//!
//! Nothing in here keeps state; `render` is a pure function.

use crate::animator::Pulse;
use crate::{Grid, HEIGHT, MAX_BRIGHT, WIDTH};
use image::{GrayImage, Luma};
use std::path::Path;

/// Number of rows the fill can occupy at 100%.
pub const FILL_ROWS: usize = 30;
/// Lowest row of the fill region (just above the bottom border).
pub const FILL_BOTTOM_ROW: usize = 32;
pub const INNER_TOP_ROW: usize = 2;
pub const BOTTOM_BORDER_ROW: usize = 33;
/// Columns the fill and the pulse overlay are drawn into.
pub const FILL_COLUMNS: std::ops::RangeInclusive<usize> = 2..=6;
pub const CENTER_COLUMN: usize = 4;

/// Width of the pulse band, in rows.
pub const SIGMA: f64 = 2.0;
/// Multiplier at the centre of the pulse band.
pub const MIN_MULTIPLIER: f64 = 10.0 / 255.0;

/// Upper bound on pixels per LED in a preview image.
pub const MAX_SCALE: u32 = 64;

/// Fill level derived from a battery percentage.
///
/// The level is a fractional row count on a 0..=30 scale, split into whole
/// rows and the remainder that drives the partial row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FillGeometry {
    pub full_rows: usize,
    pub partial_fraction: f64,
}

impl FillGeometry {
    /// Percentages outside `0..=100` are clamped.
    pub fn from_percent(percent: f64) -> Self {
        let level = (percent.clamp(0.0, 100.0) / 100.0) * FILL_ROWS as f64;
        let whole = level.floor();
        Self {
            full_rows: whole as usize,
            partial_fraction: level - whole,
        }
    }

    /// Topmost row of the solid fill; rows strictly below it are lit.
    pub fn top_fill(&self) -> usize {
        FILL_BOTTOM_ROW - self.full_rows
    }

    /// The row transitioning from dark to lit, absent once the battery is full.
    pub fn partial_row(&self) -> Option<usize> {
        (self.full_rows < FILL_ROWS).then(|| FILL_BOTTOM_ROW - self.full_rows)
    }

    fn is_full(&self, row: usize) -> bool {
        row > self.top_fill()
    }
}

/// Render one frame.
///
/// Only `pulse.center` is consulted; `fade` decides upstream whether there
/// is a centre at all.
pub fn render(percent: f64, pulse: &Pulse) -> Grid {
    let geometry = FillGeometry::from_percent(percent);
    let mut grid = Grid::new();
    let max = MAX_BRIGHT as i32;

    for col in 0..WIDTH {
        // Battery outline
        if (3..=5).contains(&col) {
            grid.set(col, 0, max);
        }
        if matches!(col, 0 | 1 | 2 | 6 | 7 | 8) {
            grid.set(col, 1, max);
        }
        if col == 0 || col == WIDTH - 1 {
            for row in INNER_TOP_ROW..=FILL_BOTTOM_ROW {
                grid.set(col, row, max);
            }
        }
        grid.set(col, BOTTOM_BORDER_ROW, max);

        if !FILL_COLUMNS.contains(&col) {
            continue;
        }
        for row in INNER_TOP_ROW..=FILL_BOTTOM_ROW {
            let value = if geometry.is_full(row) {
                max
            } else if geometry.partial_row() == Some(row) {
                partial_brightness(col, geometry.partial_fraction)
            } else {
                0
            };
            grid.set(col, row, value);
        }
    }

    apply_pulse(&mut grid, pulse.center);
    grid
}

/// Brightness of a fill column on the partial row.
///
/// The row is split into thirds of `fraction`: the centre column lights over
/// the first third, its neighbours over the second, the outer fill columns
/// over the last.
pub fn partial_brightness(col: usize, fraction: f64) -> i32 {
    let factor = match col {
        CENTER_COLUMN => fraction / 0.33,
        3 | 5 => (fraction - 0.33) / 0.33,
        2 | 6 => (fraction - 0.66) / 0.34,
        _ => 0.0,
    };
    (MAX_BRIGHT as f64 * factor.clamp(0.0, 1.0)).round() as i32
}

/// Gaussian notch: `min_multiplier` at the centre, relaxing to 1.0 away from it.
pub fn multiplier(row: f64, center: Option<f64>, sigma: f64, min_multiplier: f64) -> f64 {
    let Some(center) = center else {
        return 1.0;
    };
    let dist = (row - center) / sigma;
    1.0 - (1.0 - min_multiplier) * (-dist * dist).exp()
}

/// Dim the fill region around `center`. Borders are never touched.
pub fn apply_pulse(grid: &mut Grid, center: Option<f64>) {
    if center.is_none() {
        return;
    }
    for col in FILL_COLUMNS {
        for row in INNER_TOP_ROW..=FILL_BOTTOM_ROW {
            let m = multiplier(row as f64, center, SIGMA, MIN_MULTIPLIER);
            let dimmed = (grid.get(col, row) as f64 * m).round() as i32;
            grid.set(col, row, dimmed);
        }
    }
}

// ── Preview ──────────────────────────────────────────────────────────

/// Scale a grid up into a grayscale image, one `scale`x`scale` block per LED.
///
/// Returns `None` unless `scale` is in `1..=MAX_SCALE`.
pub fn to_image(grid: &Grid, scale: u32) -> Option<GrayImage> {
    if !(1..=MAX_SCALE).contains(&scale) {
        return None;
    }
    let width = (WIDTH as u32).checked_mul(scale)?;
    let height = (HEIGHT as u32).checked_mul(scale)?;
    Some(GrayImage::from_fn(width, height, |x, y| {
        let col = (x / scale) as usize;
        let row = (y / scale) as usize;
        Luma([grid.get(col, row)])
    }))
}

/// Write a grid as a PNG (format picked from the file extension).
pub fn save_preview(
    grid: &Grid,
    scale: u32,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = to_image(grid, scale)
        .ok_or_else(|| format!("scale must be between 1 and {MAX_SCALE}, got {scale}"))?;
    image.save(path)?;
    Ok(())
}
