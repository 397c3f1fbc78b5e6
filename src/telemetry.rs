//! Battery telemetry: where percentages and power rates come from.
//!
//! The render loop only sees the [`Telemetry`] trait. A sample is either a
//! full reading, a degraded one (percentage only, with the reason the precise
//! read failed), or `None` when no battery is installed.
//!
//! [`SysfsBattery`] reads the Linux power-supply class, e.g.
//! `/sys/class/power_supply/BAT0/{energy_now,energy_full,power_now,status}`.

use crate::animator::Mode;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the Linux power-supply class.
pub const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// One battery sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct BatteryState {
    /// State of charge, 0-100
    pub percent: f64,
    /// Power flowing into the battery, in watts
    pub charge_watts: Option<f64>,
    /// Power flowing out of the battery, in watts
    pub discharge_watts: Option<f64>,
}

impl BatteryState {
    pub fn new(percent: f64, charge_watts: Option<f64>, discharge_watts: Option<f64>) -> Self {
        Self {
            percent,
            charge_watts,
            discharge_watts,
        }
    }

    /// A reading with no power-flow information; renders as idle.
    pub fn percent_only(percent: f64) -> Self {
        Self::new(percent, None, None)
    }

    pub fn mode(&self) -> Mode {
        Mode::from_rates(self.charge_watts, self.discharge_watts)
    }
}

/// Outcome of a telemetry sample when a battery is present.
#[derive(Clone, Debug, PartialEq)]
pub enum Reading {
    Live(BatteryState),
    /// The precise read failed; `state` holds the coarse fallback.
    Degraded { state: BatteryState, reason: String },
}

impl Reading {
    pub fn state(&self) -> &BatteryState {
        match self {
            Reading::Live(state) | Reading::Degraded { state, .. } => state,
        }
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Reading::Live(_) => None,
            Reading::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// A source of battery samples, polled once per tick.
pub trait Telemetry {
    /// `None` means no battery is installed, which ends the render loop.
    fn sample(&mut self) -> Option<Reading>;
}

/// Closures work as sources, which keeps scripted runs short.
///
/// # Rust concept: blanket implementations
/// Any `FnMut() -> Option<Reading>` gets `Telemetry` for free.
impl<F> Telemetry for F
where
    F: FnMut() -> Option<Reading>,
{
    fn sample(&mut self) -> Option<Reading> {
        self()
    }
}

// ── sysfs ────────────────────────────────────────────────────────────

/// A battery exposed under `/sys/class/power_supply`.
#[derive(Clone, Debug)]
pub struct SysfsBattery {
    dir: PathBuf,
}

impl SysfsBattery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Find the first battery (`BAT*`, or any supply whose `type` is
    /// `Battery`) under a power-supply root, in name order.
    pub fn discover(root: &Path) -> Option<Self> {
        let mut candidates: Vec<PathBuf> = fs::read_dir(root)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_battery_dir(path))
            .collect();
        candidates.sort();
        candidates.into_iter().next().map(Self::new)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_present(&self) -> bool {
        if !self.dir.is_dir() {
            return false;
        }
        // Drivers without a `present` attribute only list installed batteries.
        match fs::read_to_string(self.dir.join("present")) {
            Ok(s) => s.trim() != "0",
            Err(_) => true,
        }
    }

    /// Energy (or charge) ratio plus signed power flow.
    fn read_precise(&self) -> Result<BatteryState, Box<dyn std::error::Error>> {
        let percent = self.ratio("energy_now", "energy_full").or_else(|_| {
            self.ratio("charge_now", "charge_full")
        })?;

        let Some(watts) = self.power_watts() else {
            return Ok(BatteryState::percent_only(percent));
        };

        let status = read_attr(&self.dir, "status").unwrap_or_default();
        let state = match status.as_str() {
            "Charging" => BatteryState::new(percent, Some(watts), None),
            "Discharging" => BatteryState::new(percent, None, Some(watts)),
            _ => BatteryState::percent_only(percent),
        };
        Ok(state)
    }

    fn ratio(&self, now: &str, full: &str) -> Result<f64, Box<dyn std::error::Error>> {
        let now = read_number(&self.dir, now)?;
        let full = read_number(&self.dir, full)?;
        if full <= 0.0 {
            return Err(format!("invalid full capacity {full}").into());
        }
        Ok((now / full * 100.0).clamp(0.0, 100.0))
    }

    /// `power_now` is in µW; some drivers only report µA and µV.
    fn power_watts(&self) -> Option<f64> {
        if let Ok(uw) = read_number(&self.dir, "power_now") {
            return Some(uw.abs() / 1_000_000.0);
        }
        let ua = read_number(&self.dir, "current_now").ok()?;
        let uv = read_number(&self.dir, "voltage_now").ok()?;
        Some((ua * uv).abs() / 1_000_000_000_000.0)
    }

    fn read_capacity(&self) -> Option<f64> {
        read_number(&self.dir, "capacity").ok()
    }
}

impl Telemetry for SysfsBattery {
    fn sample(&mut self) -> Option<Reading> {
        if !self.is_present() {
            return None;
        }
        match self.read_precise() {
            Ok(state) => Some(Reading::Live(state)),
            Err(e) => {
                let percent = self.read_capacity()?;
                Some(Reading::Degraded {
                    state: BatteryState::percent_only(percent.clamp(0.0, 100.0)),
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn is_battery_dir(path: &Path) -> bool {
    let named_bat = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("BAT"));
    named_bat || read_attr(path, "type").is_ok_and(|t| t == "Battery")
}

fn read_attr(dir: &Path, name: &str) -> Result<String, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(dir.join(name)).map_err(|e| format!("{name}: {e}"))?;
    Ok(raw.trim().to_string())
}

fn read_number(dir: &Path, name: &str) -> Result<f64, Box<dyn std::error::Error>> {
    let raw = read_attr(dir, name)?;
    let value = raw
        .parse::<f64>()
        .map_err(|e| format!("{name}: {e} ({raw:?})"))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write_attrs(dir: &Path, attrs: &[(&str, &str)]) {
        fs::create_dir_all(dir).unwrap();
        for (name, value) in attrs {
            fs::write(dir.join(name), format!("{value}\n")).unwrap();
        }
    }

    fn battery(attrs: &[(&str, &str)]) -> (TempDir, SysfsBattery) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("BAT0");
        write_attrs(&dir, attrs);
        (tmp, SysfsBattery::new(dir))
    }

    #[rstest]
    #[case(Some(1.0), None, Mode::Charging)]
    #[case(None, Some(1.0), Mode::Discharging)]
    #[case(None, None, Mode::Idle)]
    fn state_mode(
        #[case] charge: Option<f64>,
        #[case] discharge: Option<f64>,
        #[case] expected: Mode,
    ) {
        assert_eq!(BatteryState::new(50.0, charge, discharge).mode(), expected);
    }

    #[test]
    fn reading_accessors() {
        let live = Reading::Live(BatteryState::percent_only(10.0));
        assert_eq!(live.state().percent, 10.0);
        assert_eq!(live.degraded_reason(), None);

        let degraded = Reading::Degraded {
            state: BatteryState::percent_only(20.0),
            reason: "energy_now: missing".to_string(),
        };
        assert_eq!(degraded.state().percent, 20.0);
        assert_eq!(degraded.degraded_reason(), Some("energy_now: missing"));
    }

    #[test]
    fn closure_is_a_source() {
        let mut calls = 0;
        let mut source = || {
            calls += 1;
            Some(Reading::Live(BatteryState::percent_only(calls as f64)))
        };
        assert_eq!(source.sample().unwrap().state().percent, 1.0);
        assert_eq!(source.sample().unwrap().state().percent, 2.0);
    }

    #[test]
    fn discharging_energy_battery() {
        let (_tmp, mut bat) = battery(&[
            ("energy_now", "30000000"),
            ("energy_full", "60000000"),
            ("power_now", "12500000"),
            ("status", "Discharging"),
            ("capacity", "49"),
        ]);

        let reading = bat.sample().unwrap();
        assert_eq!(
            reading,
            Reading::Live(BatteryState::new(50.0, None, Some(12.5)))
        );
    }

    #[test]
    fn charging_charge_battery_uses_current_and_voltage() {
        let (_tmp, mut bat) = battery(&[
            ("charge_now", "1500000"),
            ("charge_full", "2000000"),
            ("current_now", "2000000"),
            ("voltage_now", "12000000"),
            ("status", "Charging"),
        ]);

        let reading = bat.sample().unwrap();
        assert_eq!(
            reading,
            Reading::Live(BatteryState::new(75.0, Some(24.0), None))
        );
    }

    #[rstest]
    #[case("Full")]
    #[case("Not charging")]
    #[case("Unknown")]
    fn other_status_is_idle(#[case] status: &str) {
        let (_tmp, mut bat) = battery(&[
            ("energy_now", "50"),
            ("energy_full", "100"),
            ("power_now", "0"),
            ("status", status),
        ]);
        let reading = bat.sample().unwrap();
        assert_eq!(reading.state().mode(), Mode::Idle);
        assert_eq!(reading.degraded_reason(), None);
    }

    #[test]
    fn invalid_full_capacity_falls_back_to_capacity() {
        let (_tmp, mut bat) = battery(&[
            ("energy_now", "100"),
            ("energy_full", "0"),
            ("power_now", "9000000"),
            ("status", "Charging"),
            ("capacity", "63"),
        ]);

        let reading = bat.sample().unwrap();
        assert_eq!(reading.state(), &BatteryState::percent_only(63.0));
        assert_eq!(reading.state().mode(), Mode::Idle);
        assert!(reading.degraded_reason().is_some());
    }

    #[test]
    fn unparsable_energy_falls_back_to_capacity() {
        let (_tmp, mut bat) = battery(&[("energy_now", "garbage"), ("capacity", "12")]);
        let reading = bat.sample().unwrap();
        assert_eq!(reading.state().percent, 12.0);
        assert!(reading.degraded_reason().unwrap().contains("charge_now"));
    }

    #[test]
    fn missing_directory_means_no_battery() {
        let tmp = TempDir::new().unwrap();
        let mut bat = SysfsBattery::new(tmp.path().join("BAT9"));
        assert_eq!(bat.sample(), None);
    }

    #[test]
    fn not_present_means_no_battery() {
        let (_tmp, mut bat) = battery(&[("present", "0"), ("capacity", "80")]);
        assert_eq!(bat.sample(), None);
    }

    #[test]
    fn battery_removed_between_samples() {
        let (tmp, mut bat) = battery(&[("energy_now", "1"), ("energy_full", "2")]);
        assert!(bat.sample().is_some());
        fs::remove_dir_all(tmp.path().join("BAT0")).unwrap();
        assert_eq!(bat.sample(), None);
    }

    #[test]
    fn discover_picks_first_battery() {
        let tmp = TempDir::new().unwrap();
        write_attrs(&tmp.path().join("AC"), &[("type", "Mains")]);
        write_attrs(&tmp.path().join("BAT1"), &[("type", "Battery")]);
        write_attrs(&tmp.path().join("BAT0"), &[("type", "Battery")]);

        let bat = SysfsBattery::discover(tmp.path()).unwrap();
        assert_eq!(bat.dir(), tmp.path().join("BAT0"));
    }

    #[test]
    fn discover_accepts_battery_type_without_bat_name() {
        let tmp = TempDir::new().unwrap();
        write_attrs(&tmp.path().join("AC"), &[("type", "Mains")]);
        write_attrs(&tmp.path().join("macsmc-battery"), &[("type", "Battery")]);

        let bat = SysfsBattery::discover(tmp.path()).unwrap();
        assert_eq!(bat.dir(), tmp.path().join("macsmc-battery"));
    }

    #[test]
    fn discover_without_battery() {
        let tmp = TempDir::new().unwrap();
        write_attrs(&tmp.path().join("AC"), &[("type", "Mains")]);
        assert!(SysfsBattery::discover(tmp.path()).is_none());
        assert!(SysfsBattery::discover(&tmp.path().join("missing")).is_none());
    }
}
