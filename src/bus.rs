//! DC bus and power port algebra (Component A).
//!
//! A [`DcBus`] models a physical rail shared by one or more terminals; a
//! [`Port`] binds a bus to a single terminal (battery, solar input, load
//! output) and tracks that terminal's current and directional limits.
//! Neither component owns the other — the slow tick passes references to
//! both into whichever component needs them, in the order spec §9 calls
//! for (charger before power stage).

use signal_processing::iir::Lag;

/// Default lag-filter time constant for bus voltage/current smoothing.
pub const FILTER_TIME_CONSTANT_S: f32 = 1.0;

/// A physical rail: battery bus, solar bus, or load bus.
pub struct DcBus {
    pub voltage: f32,
    voltage_filter: Lag,

    /// 1 for a single nominal battery, 2 for two in series. Auto-detected
    /// at startup from the idle voltage.
    pub series_multiplier: u8,

    pub sink_voltage_intercept: f32,
    pub sink_droop_res: f32,
    pub src_voltage_intercept: f32,
    pub src_droop_res: f32,
}

impl DcBus {
    pub fn new() -> Self {
        Self {
            voltage: 0.0,
            voltage_filter: Lag::from_time_constant(FILTER_TIME_CONSTANT_S, 0.1),
            series_multiplier: 1,
            sink_voltage_intercept: 0.0,
            sink_droop_res: 0.0,
            src_voltage_intercept: 0.0,
            src_droop_res: 0.0,
        }
    }

    pub fn voltage_filtered(&self) -> f32 {
        self.voltage_filter.value().unwrap_or(self.voltage)
    }

    /// Feeds a new instantaneous voltage sample, updating the filtered
    /// value. Called once per fast tick by the measurement adapter.
    pub fn update_voltage(&mut self, voltage: f32) {
        self.voltage = voltage;
        self.voltage_filter.update(voltage);
    }

    /// Detects whether one or two batteries are connected in series by
    /// comparing the idle bus voltage against the battery's absolute
    /// voltage window, doubled.
    pub fn detect_series_multiplier(&mut self, absolute_min: f32, absolute_max: f32) {
        self.series_multiplier = if self.voltage > absolute_min * 2.0 && self.voltage < absolute_max * 2.0 {
            2
        } else {
            1
        };
    }

    /// `(v0 or sink_intercept) * series_multiplier - droop * current`.
    pub fn sink_control_voltage(&self, v0: Option<f32>, current: f32) -> f32 {
        let intercept = v0.unwrap_or(self.sink_voltage_intercept);
        intercept * self.series_multiplier as f32 - self.sink_droop_res * current
    }

    /// `(v0 or src_intercept) * series_multiplier - droop * current`.
    pub fn src_control_voltage(&self, v0: Option<f32>, current: f32) -> f32 {
        let intercept = v0.unwrap_or(self.src_voltage_intercept);
        intercept * self.series_multiplier as f32 - self.src_droop_res * current
    }
}

impl Default for DcBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Binds a [`DcBus`] to a single terminal (battery, solar input, or load).
pub struct Port {
    pub current: f32,
    current_filter: Lag,

    /// Directional limits. `pos_current_limit >= 0`, `neg_current_limit <= 0`.
    pub pos_current_limit: f32,
    pub neg_current_limit: f32,

    pub pos_energy_wh: f32,
    pub neg_energy_wh: f32,
}

impl Port {
    pub fn new() -> Self {
        Self {
            current: 0.0,
            current_filter: Lag::from_time_constant(FILTER_TIME_CONSTANT_S, 0.1),
            pos_current_limit: 0.0,
            neg_current_limit: 0.0,
            pos_energy_wh: 0.0,
            neg_energy_wh: 0.0,
        }
    }

    pub fn current_filtered(&self) -> f32 {
        self.current_filter.value().unwrap_or(self.current)
    }

    pub fn update_current(&mut self, current: f32) {
        self.current = current;
        self.current_filter.update(current);
    }

    pub fn pos_current_margin(&self) -> f32 {
        self.pos_current_limit - self.current
    }

    pub fn neg_current_margin(&self) -> f32 {
        self.neg_current_limit - self.current
    }

    /// Integrates `voltage * current` into the appropriate energy counter.
    /// Must be called exactly once per second (spec §4.2).
    pub fn energy_balance(&mut self, voltage: f32) {
        let power = voltage * self.current;
        if power > 0.0 {
            self.pos_energy_wh += power / 3600.0;
        } else {
            self.neg_energy_wh += -power / 3600.0;
        }
    }

    /// True only when both directional limits obey the sign discipline
    /// invariant (§8.1).
    pub fn limits_valid(&self) -> bool {
        self.pos_current_limit >= 0.0 && self.neg_current_limit <= 0.0
    }
}

impl Default for Port {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_control_voltage_applies_droop() {
        let mut bus = DcBus::new();
        bus.sink_voltage_intercept = 14.2;
        bus.sink_droop_res = 0.1;
        bus.series_multiplier = 1;
        assert!((bus.sink_control_voltage(None, 10.0) - (14.2 - 1.0)).abs() < 1e-6);
    }

    #[test]
    fn series_multiplier_detects_two_batteries() {
        let mut bus = DcBus::new();
        bus.voltage = 25.0;
        bus.detect_series_multiplier(10.0, 14.4);
        assert_eq!(bus.series_multiplier, 2);
    }

    #[test]
    fn series_multiplier_detects_single_battery() {
        let mut bus = DcBus::new();
        bus.voltage = 13.0;
        bus.detect_series_multiplier(10.0, 14.4);
        assert_eq!(bus.series_multiplier, 1);
    }

    #[test]
    fn energy_balance_splits_by_sign() {
        let mut port = Port::new();
        port.current = 5.0;
        port.energy_balance(12.0);
        assert!(port.pos_energy_wh > 0.0);
        assert_eq!(port.neg_energy_wh, 0.0);

        port.current = -5.0;
        port.energy_balance(12.0);
        assert!(port.neg_energy_wh > 0.0);
    }

    #[test]
    fn limits_valid_enforces_sign_discipline() {
        let mut port = Port::new();
        port.pos_current_limit = 10.0;
        port.neg_current_limit = -5.0;
        assert!(port.limits_valid());

        port.neg_current_limit = 5.0;
        assert!(!port.limits_valid());
    }
}
