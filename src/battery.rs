//! Battery configuration (Component B): chemistry-derived thresholds and
//! validation.
//!
//! Grounded on `BatConf`/`battery_conf_init`/`battery_conf_check`/
//! `battery_conf_overwrite`/`battery_conf_changed` in the original firmware.

/// Chemistry tag selecting the per-cell constant table used by [`BatteryConfig::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BatteryChemistry {
    Flooded,
    Agm,
    Gel,
    Lfp,
    Nmc,
    NmcHv,
    /// All fields must be set manually; [`BatteryConfig::init`] leaves them
    /// at zero for this tag.
    Custom,
}

/// Immutable-after-init, chemistry-parameterized configuration. All
/// voltage-scale fields are per-battery (already multiplied by `num_cells`),
/// matching `BatConf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryConfig {
    pub nominal_capacity: f32,

    pub absolute_min_voltage: f32,
    pub absolute_max_voltage: f32,
    pub topping_voltage: f32,
    pub float_voltage: f32,
    pub equalization_voltage: f32,
    pub recharge_voltage: f32,

    pub load_disconnect_voltage: f32,
    pub load_reconnect_voltage: f32,

    pub charge_current_max: f32,
    pub discharge_current_max: f32,

    pub topping_cutoff_current: f32,
    pub topping_duration: u32,
    pub time_limit_recharge: u32,

    pub float_enabled: bool,
    pub float_recharge_time: u32,

    pub equalization_enabled: bool,
    pub equalization_duration: u32,
    pub equalization_current_limit: f32,
    pub equalization_trigger_days: u32,
    pub equalization_trigger_deep_cycles: u32,

    pub charge_temp_min: f32,
    pub charge_temp_max: f32,
    pub discharge_temp_min: f32,
    pub discharge_temp_max: f32,

    pub internal_resistance: f32,
    pub wire_resistance: f32,
    pub temperature_compensation: f32,

    pub ocv_full: f32,
    pub ocv_empty: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            nominal_capacity: 0.0,
            absolute_min_voltage: 0.0,
            absolute_max_voltage: 0.0,
            topping_voltage: 0.0,
            float_voltage: 0.0,
            equalization_voltage: 0.0,
            recharge_voltage: 0.0,
            load_disconnect_voltage: 0.0,
            load_reconnect_voltage: 0.0,
            charge_current_max: 0.0,
            discharge_current_max: 0.0,
            topping_cutoff_current: 0.0,
            topping_duration: 120 * 60,
            time_limit_recharge: 60,
            float_enabled: false,
            float_recharge_time: 30 * 60,
            equalization_enabled: false,
            equalization_duration: 60 * 60,
            equalization_current_limit: 0.0,
            equalization_trigger_days: 60,
            equalization_trigger_deep_cycles: 10,
            charge_temp_min: -10.0,
            charge_temp_max: 50.0,
            discharge_temp_min: -10.0,
            discharge_temp_max: 50.0,
            internal_resistance: 0.0,
            wire_resistance: 0.0,
            temperature_compensation: 0.0,
            ocv_full: 0.0,
            ocv_empty: 0.0,
        }
    }
}

impl BatteryConfig {
    /// Materializes all derived thresholds from a chemistry tag, cell count
    /// and nominal capacity. `discharge_current_max` is used as-is for the
    /// internal/wire-resistance voltage-drop terms, matching the original's
    /// `DISCHARGE_CURRENT_MAX` board constant.
    pub fn init(chemistry: BatteryChemistry, num_cells: u32, nominal_capacity: f32) -> Self {
        let n = num_cells as f32;
        let mut bat = Self {
            nominal_capacity,
            charge_current_max: nominal_capacity,
            discharge_current_max: nominal_capacity,
            ..Self::default()
        };

        let discharge_current_max = bat.discharge_current_max.max(f32::EPSILON);

        match chemistry {
            BatteryChemistry::Flooded | BatteryChemistry::Agm | BatteryChemistry::Gel => {
                bat.absolute_max_voltage = n * 2.45;
                bat.topping_voltage = n * 2.4;
                bat.recharge_voltage = n * 2.2;
                bat.load_disconnect_voltage = n * 1.95;
                bat.load_reconnect_voltage = n * 2.10;
                bat.internal_resistance = n * (1.95 - 1.80) / discharge_current_max;
                bat.absolute_min_voltage = n * 1.6;
                bat.ocv_full = n * if chemistry == BatteryChemistry::Flooded { 2.10 } else { 2.15 };
                bat.ocv_empty = n * 1.90;
                bat.topping_cutoff_current = nominal_capacity * 0.04;
                bat.float_enabled = true;
                bat.float_recharge_time = 30 * 60;
                bat.float_voltage = n * if chemistry == BatteryChemistry::Flooded { 2.35 } else { 2.3 };
                bat.equalization_enabled = false;
                bat.equalization_voltage = n * if chemistry == BatteryChemistry::Flooded { 2.50 } else { 2.45 };
                bat.equalization_duration = 60 * 60;
                bat.equalization_current_limit = nominal_capacity / 7.0;
                bat.equalization_trigger_days = 60;
                bat.equalization_trigger_deep_cycles = 10;
                bat.temperature_compensation = -0.003;
            }
            BatteryChemistry::Lfp => {
                bat.topping_voltage = n * 3.55;
                bat.absolute_max_voltage = n * 3.60;
                bat.recharge_voltage = n * 3.35;
                bat.load_disconnect_voltage = n * 3.00;
                bat.load_reconnect_voltage = n * 3.15;
                bat.internal_resistance = bat.load_disconnect_voltage * 0.05 / discharge_current_max;
                bat.absolute_min_voltage = n * 2.0;
                bat.ocv_full = n * 3.4;
                bat.ocv_empty = n * 3.0;
                bat.topping_cutoff_current = nominal_capacity / 10.0;
                bat.float_enabled = false;
                bat.equalization_enabled = false;
                bat.temperature_compensation = 0.0;
                bat.charge_temp_min = 0.0;
            }
            BatteryChemistry::Nmc | BatteryChemistry::NmcHv => {
                bat.topping_voltage = n * if chemistry == BatteryChemistry::NmcHv { 4.35 } else { 4.20 };
                bat.absolute_max_voltage = bat.topping_voltage + n * 0.05;
                bat.recharge_voltage = n * 3.9;
                bat.load_disconnect_voltage = n * 3.3;
                bat.load_reconnect_voltage = n * 3.6;
                bat.internal_resistance = bat.load_disconnect_voltage * 0.05 / discharge_current_max;
                bat.absolute_min_voltage = n * 2.5;
                bat.ocv_full = n * 4.0;
                bat.ocv_empty = n * 3.0;
                bat.topping_cutoff_current = nominal_capacity / 10.0;
                bat.float_enabled = false;
                bat.equalization_enabled = false;
                bat.temperature_compensation = 0.0;
                bat.charge_temp_min = 0.0;
            }
            BatteryChemistry::Custom => {
                // All fields left at Self::default(); caller must fill them in.
            }
        }

        bat
    }

    /// Flat, ownership-free predicate table — the reframing of the lambda
    /// array the original config-check function builds (spec §9).
    const VALIDATION_RULES: &'static [(fn(&BatteryConfig) -> bool, &'static str)] = &[
        (
            |b| b.load_reconnect_voltage > b.load_disconnect_voltage + 0.4,
            "load reconnect voltage must be higher than load disconnect voltage + 0.4",
        ),
        (
            |b| b.recharge_voltage < b.topping_voltage - 0.4,
            "recharge voltage must be lower than topping voltage - 0.4",
        ),
        (
            |b| b.recharge_voltage > b.load_disconnect_voltage + 1.0,
            "recharge voltage must be higher than load disconnect voltage + 1.0",
        ),
        (
            |b| b.load_disconnect_voltage > b.absolute_min_voltage + 0.4,
            "load disconnect voltage must be higher than absolute min voltage + 0.4",
        ),
        (
            |b| {
                b.internal_resistance
                    < b.load_disconnect_voltage * 0.1 / b.discharge_current_max.max(f32::EPSILON)
            },
            "internal resistance must not cause more than 10% drop at max discharge current",
        ),
        (
            |b| {
                b.wire_resistance
                    < b.topping_voltage * 0.03 / b.discharge_current_max.max(f32::EPSILON)
            },
            "wire resistance must not cause more than 3% drop at max discharge current",
        ),
        (
            |b| b.topping_cutoff_current > 0.01 && b.topping_cutoff_current < b.nominal_capacity / 10.0,
            "topping cutoff current out of bounds",
        ),
        (
            |b| {
                !b.float_enabled
                    || (b.load_disconnect_voltage < b.float_voltage && b.float_voltage < b.topping_voltage)
            },
            "float voltage must lie strictly between load disconnect and topping voltage",
        ),
    ];

    /// Runs every validation rule, logging each failure at `error!` and
    /// returning `true` only if all pass.
    pub fn validate(&self) -> bool {
        let mut ok = true;
        for (predicate, message) in Self::VALIDATION_RULES {
            if !predicate(self) {
                error!("battery config invalid: {}", message);
                ok = false;
            }
        }
        ok
    }

    /// Structural diff over the published fields.
    pub fn changed(a: &BatteryConfig, b: &BatteryConfig) -> bool {
        a != b
    }
}

/// Copies `src` into `dst`. If `nominal_capacity` changed, the caller must
/// reset the charger's coulomb counter, usable capacity, and SOH — this
/// function only reports whether that side effect is needed.
pub fn overwrite(src: &BatteryConfig, dst: &mut BatteryConfig) -> bool {
    let capacity_changed = src.nominal_capacity != dst.nominal_capacity;
    *dst = *src;
    capacity_changed
}
