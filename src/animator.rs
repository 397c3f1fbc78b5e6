//! Pulse animation state machine.
//!
//! A pulse is a dark band that travels through the lit part of the battery:
//! upward while charging, downward while discharging. `PulseState` is the only
//! value carried from one tick to the next, and [`update`] is a pure function
//! of that state and the current battery reading, so a sequence of readings
//! always replays to the same trajectory.

use crate::frame::FillGeometry;
use crate::telemetry::BatteryState;
use serde::Serialize;

/// How far `fade` moves toward its target on each tick.
pub const FADE_SPEED: f64 = 0.01;
/// Watts are divided by this to get rows per tick.
pub const STEP_SCALE: f64 = 100.0;
pub const PULSE_SPEED_MODIFIER: f64 = 2.0;
/// Row where a charging pulse (re)starts: the bottom border.
pub const PULSE_BOTTOM_ROW: f64 = 33.0;

/// Direction of power flow for one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Charging,
    Discharging,
    Idle,
}

impl Mode {
    /// Charging wins over discharging; absent or zero rates count as no flow.
    pub fn from_rates(charge_watts: Option<f64>, discharge_watts: Option<f64>) -> Self {
        if charge_watts.is_some_and(|w| w > 0.0) {
            Mode::Charging
        } else if discharge_watts.is_some_and(|w| w > 0.0) {
            Mode::Discharging
        } else {
            Mode::Idle
        }
    }

    /// Fade level the pulse is heading toward in this mode.
    pub fn target_fade(self) -> f64 {
        match self {
            Mode::Idle => 0.0,
            Mode::Charging | Mode::Discharging => 1.0,
        }
    }
}

/// Carried animation state.
///
/// # Rust concept: Copy types as values
/// `PulseState` is two floats, so it derives `Copy`. `update` takes the old
/// state by value and returns a new one instead of mutating in place, which
/// makes replaying a sequence of readings trivial in tests.
///
/// `position` is a fractional row coordinate, `None` until the first time
/// power flows. It is kept (frozen) while idle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PulseState {
    pub position: Option<f64>,
    pub fade: f64,
}

/// What the renderer gets to see of the pulse on one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pulse {
    /// Row the dark band is centred on, or `None` when no pulse is shown.
    pub center: Option<f64>,
    pub fade: f64,
}

impl PulseState {
    /// Startup state: no position, fully faded out.
    pub fn new() -> Self {
        Self::default()
    }

    /// The pulse is shown only while `fade` is above zero.
    ///
    /// `fade` gates visibility; it does not weaken the band. A pulse at
    /// fade 0.01 renders exactly like one at 1.0.
    ///
    /// Going idle does not hide the band at once: the position freezes and
    /// the band stays visible where it stopped until `fade` ramps down to 0.
    pub fn visible(&self) -> Pulse {
        let center = if self.fade > 0.0 { self.position } else { None };
        Pulse {
            center,
            fade: self.fade,
        }
    }
}

/// Advance the animation by one tick.
pub fn update(previous: PulseState, battery: &BatteryState) -> PulseState {
    let mode = battery.mode();
    let fade = step_fade(previous.fade, mode.target_fade());
    let top_fill = FillGeometry::from_percent(battery.percent).top_fill() as f64;

    let position = match mode {
        Mode::Charging => {
            let rate = battery.charge_watts.unwrap_or(0.0);
            Some(step_charging(previous.position, rate, top_fill))
        }
        Mode::Discharging => {
            let rate = battery.discharge_watts.unwrap_or(0.0);
            Some(step_discharging(previous.position, rate, top_fill))
        }
        Mode::Idle => previous.position,
    };

    PulseState { position, fade }
}

/// Rows the pulse travels per tick at the given power.
pub fn rows_per_tick(watts: f64) -> f64 {
    (watts / STEP_SCALE) * PULSE_SPEED_MODIFIER
}

fn step_fade(fade: f64, target: f64) -> f64 {
    let next = if fade < target {
        fade + FADE_SPEED
    } else if fade > target {
        fade - FADE_SPEED
    } else {
        fade
    };
    next.clamp(0.0, 1.0)
}

/// Rising sweep from the bottom border; restarts once it leaves the fill.
fn step_charging(position: Option<f64>, watts: f64, top_fill: f64) -> f64 {
    let next = match position {
        None => PULSE_BOTTOM_ROW,
        Some(p) => p - rows_per_tick(watts),
    };
    if next < top_fill { PULSE_BOTTOM_ROW } else { next }
}

/// Falling sweep from the top of the fill; restarts past the bottom border.
fn step_discharging(position: Option<f64>, watts: f64, top_fill: f64) -> f64 {
    let next = match position {
        None => top_fill,
        Some(p) => p + rows_per_tick(watts),
    };
    if next > PULSE_BOTTOM_ROW { top_fill } else { next }
}
