//! Device status and energy accounting (Component F).
//!
//! Grounded on `DeviceStatus`/`update_energy`/`update_min_max_values` in the
//! original firmware. The error-flags bitset is the single cross-component
//! source of truth for fault gating (spec §4.7, §7).

use crate::error::FaultKind;

/// Seconds of `solar < battery` required before a subsequent crossing is
/// treated as a sunrise (day rollover), per spec §8.1.
const NIGHT_THRESHOLD_S: u32 = 5 * 60 * 60;

/// Error-flags word: one bit per [`FaultKind`]. Reads/writes of this word
/// must be atomic at the word level (spec §5): the fast tick and an ISR can
/// race the slow tick, so every mutation runs inside `critical_section::with`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorFlags(u32);

impl ErrorFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn set(&mut self, fault: FaultKind) {
        critical_section::with(|_| self.0 |= fault.mask());
    }

    pub fn clear(&mut self, fault: FaultKind) {
        critical_section::with(|_| self.0 &= !fault.mask());
    }

    pub fn has(&self, fault: FaultKind) -> bool {
        self.0 & fault.mask() != 0
    }

    pub fn has_any(&self, faults: &[FaultKind]) -> bool {
        faults.iter().any(|f| self.has(*f))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Lifetime and daily energy/min-max accounting plus the error-flags word.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceStatus {
    pub error_flags: ErrorFlags,
    pub internal_temp: f32,

    pub bat_chg_total_wh: f32,
    pub bat_dis_total_wh: f32,
    pub solar_in_total_wh: f32,
    pub load_out_total_wh: f32,

    pub solar_power_max_day: f32,
    pub load_power_max_day: f32,
    pub solar_power_max_total: f32,
    pub load_power_max_total: f32,

    pub battery_voltage_max: f32,
    pub solar_voltage_max: f32,
    pub dcdc_current_max: f32,
    pub load_current_max: f32,
    pub bat_temp_max: f32,
    pub int_temp_max: f32,
    pub mosfet_temp_max: f32,

    pub day_counter: u32,
    seconds_zero_solar: u32,
}

impl DeviceStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called exactly once per second (spec §4.7). Adds this
    /// second's positive bus energy deltas to the lifetime counters, and on
    /// a sunrise transition (solar voltage exceeding battery voltage after
    /// more than [`NIGHT_THRESHOLD_S`] of the opposite condition) bumps
    /// `day_counter` and zeroes the daily max-power counters.
    pub fn update_energy(&mut self, solar_voltage: f32, battery_voltage: f32, bat_pos_energy_wh_delta: f32, bat_neg_energy_wh_delta: f32, solar_neg_energy_wh_delta: f32, load_pos_energy_wh_delta: f32) {
        if solar_voltage < battery_voltage {
            self.seconds_zero_solar += 1;
        } else {
            if self.seconds_zero_solar > NIGHT_THRESHOLD_S {
                self.day_counter += 1;
                self.solar_power_max_day = 0.0;
                self.load_power_max_day = 0.0;
            }
            self.seconds_zero_solar = 0;
        }

        if bat_pos_energy_wh_delta > 0.0 {
            self.bat_chg_total_wh += bat_pos_energy_wh_delta;
        }
        if bat_neg_energy_wh_delta > 0.0 {
            self.bat_dis_total_wh += bat_neg_energy_wh_delta;
        }
        if solar_neg_energy_wh_delta > 0.0 {
            self.solar_in_total_wh += solar_neg_energy_wh_delta;
        }
        if load_pos_energy_wh_delta > 0.0 {
            self.load_out_total_wh += load_pos_energy_wh_delta;
        }
    }

    /// Updates lifetime/daily maxima from the current tick's measurements.
    #[allow(clippy::too_many_arguments)]
    pub fn update_min_max(
        &mut self,
        battery_voltage: f32,
        solar_voltage: f32,
        dcdc_current: f32,
        load_current: f32,
        solar_power: f32,
        load_power: f32,
        bat_temperature: f32,
        mosfet_temp: f32,
    ) {
        self.battery_voltage_max = self.battery_voltage_max.max(battery_voltage);
        self.solar_voltage_max = self.solar_voltage_max.max(solar_voltage);
        self.dcdc_current_max = self.dcdc_current_max.max(dcdc_current);
        self.load_current_max = self.load_current_max.max(load_current);
        self.bat_temp_max = self.bat_temp_max.max(bat_temperature);
        self.int_temp_max = self.int_temp_max.max(self.internal_temp);
        self.mosfet_temp_max = self.mosfet_temp_max.max(mosfet_temp);

        if solar_power > self.solar_power_max_day {
            self.solar_power_max_day = solar_power;
            self.solar_power_max_total = self.solar_power_max_total.max(solar_power);
        }
        if load_power > self.load_power_max_day {
            self.load_power_max_day = load_power;
            self.load_power_max_total = self.load_power_max_total.max(load_power);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_flags_set_clear_roundtrip() {
        let mut flags = ErrorFlags::empty();
        assert!(flags.is_empty());
        flags.set(FaultKind::BatOvervoltage);
        assert!(flags.has(FaultKind::BatOvervoltage));
        assert!(!flags.has(FaultKind::BatUndervoltage));
        flags.clear(FaultKind::BatOvervoltage);
        assert!(flags.is_empty());
    }

    #[test]
    fn day_rollover_after_five_hours_dark() {
        let mut status = DeviceStatus::new();
        status.solar_power_max_day = 400.0;

        for _ in 0..(NIGHT_THRESHOLD_S + 1) {
            status.update_energy(5.0, 12.0, 0.0, 0.0, 0.0, 0.0);
        }
        assert_eq!(status.day_counter, 0);

        status.update_energy(20.0, 12.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(status.day_counter, 1);
        assert_eq!(status.solar_power_max_day, 0.0);
    }

    #[test]
    fn no_rollover_on_brief_dip() {
        let mut status = DeviceStatus::new();
        for _ in 0..10 {
            status.update_energy(5.0, 12.0, 0.0, 0.0, 0.0, 0.0);
        }
        status.update_energy(20.0, 12.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(status.day_counter, 0);
    }

    #[test]
    fn energy_totals_accumulate_only_positive_deltas() {
        let mut status = DeviceStatus::new();
        status.update_energy(20.0, 12.0, 1.0, -1.0, -1.0, 1.0);
        assert_eq!(status.bat_chg_total_wh, 1.0);
        assert_eq!(status.bat_dis_total_wh, 0.0);
        assert_eq!(status.load_out_total_wh, 1.0);
    }
}
