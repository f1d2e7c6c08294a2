//! Charger state machine (Component C).
//!
//! Grounded directly on `Charger::charge_control`/`discharge_control`/
//! `update_soc`/`enter_state`/`init_terminal` in the original firmware.
//! `tick()` is invoked once per second from the slow task; time is passed in
//! explicitly (monotonic uptime seconds) rather than read from a clock, per
//! the "explicit controller context" redesign note (spec §9).

use crate::battery::BatteryConfig;
use crate::bus::{DcBus, Port};
use crate::error::FaultKind;
use crate::status::ErrorFlags;

/// Sentinel for "this timestamp has never been set", matching the
/// original's `CHARGER_TIME_NEVER`.
pub const TIME_NEVER: u64 = u64::MAX;

/// Smoothing factor for the voltage-based SoC filter (`alpha = 1/100` in
/// the original's `update_soc`).
const SOC_FILTER_ALPHA: f32 = 1.0 / 100.0;

/// Current magnitude below which the voltage-based SoC estimate is trusted.
const SOC_REST_CURRENT_A: f32 = 0.2;

const TOPPING_FALLBACK_S: u64 = 8 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargerState {
    Idle,
    Bulk,
    Topping,
    Float,
    Equalization,
    Follower,
}

pub struct Charger {
    pub state: ChargerState,

    pub bat_temperature: f32,
    pub ext_temp_sensor: bool,

    pub usable_capacity: f32,
    pub discharged_ah: f32,
    pub num_full_charges: u32,
    pub num_deep_discharges: u32,

    /// Percent, 0..=100.
    pub soc: f32,
    /// Percent, 0..=100.
    pub soh: f32,
    soc_filter_initialized: bool,

    pub full: bool,
    pub empty: bool,

    pub time_state_changed: u64,
    pub time_target_voltage_reached: u64,
    pub target_voltage_timer: u64,
    pub time_last_equalization: u64,
    pub deep_dis_last_equalization: u32,
    pub time_last_ctrl_msg: u64,

    /// Current target published for peer controllers sharing the bus, and
    /// the value accepted from a peer while in Follower mode.
    pub target_current_control: f32,
}

impl Charger {
    pub fn new() -> Self {
        Self {
            state: ChargerState::Idle,
            bat_temperature: 25.0,
            ext_temp_sensor: false,
            usable_capacity: 0.0,
            discharged_ah: 0.0,
            num_full_charges: 0,
            num_deep_discharges: 0,
            soc: 0.0,
            soh: 0.0,
            soc_filter_initialized: false,
            full: false,
            empty: false,
            time_state_changed: TIME_NEVER,
            time_target_voltage_reached: 0,
            target_voltage_timer: 0,
            time_last_equalization: 0,
            deep_dis_last_equalization: 0,
            time_last_ctrl_msg: 0,
            target_current_control: 0.0,
        }
    }

    fn enter_state(&mut self, now: u64, next: ChargerState) {
        debug!("charger entering state {:?}", next);
        self.time_state_changed = now;
        self.state = next;
    }

    /// Initializes the bus/port intercepts and droop resistances for a
    /// newly committed battery configuration. Grounded on
    /// `Charger::init_terminal`.
    pub fn init_terminal(&self, bus: &mut DcBus, port: &mut Port, bat: &BatteryConfig) {
        bus.sink_voltage_intercept = bat.topping_voltage;
        bus.src_voltage_intercept = bat.load_disconnect_voltage;

        port.neg_current_limit = -bat.discharge_current_max;
        port.pos_current_limit = bat.charge_current_max;

        let series = bus.series_multiplier.max(1) as f32;
        bus.sink_droop_res = -bat.wire_resistance / series;
        bus.src_droop_res = -bat.wire_resistance / series - bat.internal_resistance;
    }

    /// Coulomb counting and voltage-based SoC/SOH update. Independent of
    /// charger state; called once per second from `tick()`.
    fn update_soc(&mut self, bus: &DcBus, port: &Port, bat: &BatteryConfig, load_shedding: bool) {
        if port.current.abs() < SOC_REST_CURRENT_A {
            let raw = ((bus.voltage - bat.ocv_empty) / (bat.ocv_full - bat.ocv_empty)) * 100.0;

            if raw > 5.0 && !self.soc_filter_initialized {
                self.soc = raw;
                self.soc_filter_initialized = true;
            } else {
                self.soc += (raw - self.soc) * SOC_FILTER_ALPHA;
                self.soc_filter_initialized = true;
            }
            self.soc = self.soc.clamp(0.0, 100.0);
        }

        self.discharged_ah += -port.current / 3600.0;

        if !self.empty && load_shedding {
            self.empty = true;
            self.num_deep_discharges += 1;

            if self.usable_capacity == 0.0 {
                self.usable_capacity = self.discharged_ah;
            } else {
                self.usable_capacity = 0.8 * self.usable_capacity + 0.2 * self.discharged_ah;
            }
            self.soh = (self.usable_capacity / bat.nominal_capacity.max(f32::EPSILON)) * 100.0;
        }
        // `empty` is cleared only by discharge_control's voltage-hysteresis
        // check, never here.
    }

    /// Gates discharge current against LVD and discharge-temperature
    /// limits. Grounded on `Charger::discharge_control`.
    ///
    /// The `empty` latch's clear condition converges on hysteresis-on-
    /// voltage per the open-question decision recorded in DESIGN.md:
    /// `LOAD_SHEDDING` is an entry condition only, never a clear condition.
    fn discharge_control(&mut self, bus: &DcBus, port: &mut Port, bat: &BatteryConfig, errors: &mut ErrorFlags) {
        if self.empty
            && bus.voltage >= bus.src_control_voltage(Some(bat.load_reconnect_voltage), port.current)
        {
            self.empty = false;
        }

        if port.neg_current_limit < 0.0 {
            if bus.voltage < bus.src_control_voltage(Some(bat.absolute_min_voltage), port.current) {
                port.neg_current_limit = 0.0;
                errors.set(FaultKind::BatUndervoltage);
            }
            if self.bat_temperature > bat.discharge_temp_max {
                port.neg_current_limit = 0.0;
                errors.set(FaultKind::BatDischargeOvertemp);
            } else if self.bat_temperature < bat.discharge_temp_min {
                port.neg_current_limit = 0.0;
                errors.set(FaultKind::BatDischargeUndertemp);
            }
        } else {
            if bus.voltage
                >= bus.src_control_voltage(Some(bat.absolute_min_voltage + 0.1), port.current)
            {
                errors.clear(FaultKind::BatUndervoltage);
            }
            if self.bat_temperature < bat.discharge_temp_max - 1.0
                && self.bat_temperature > bat.discharge_temp_min + 1.0
            {
                errors.clear(FaultKind::BatDischargeOvertemp);
                errors.clear(FaultKind::BatDischargeUndertemp);
            }
            if !errors.has_any(&[
                FaultKind::BatUndervoltage,
                FaultKind::BatDischargeOvertemp,
                FaultKind::BatDischargeUndertemp,
            ]) {
                port.neg_current_limit = -bat.discharge_current_max;
            }
        }
    }

    fn topping_setpoint(&self, bat: &BatteryConfig) -> f32 {
        bat.topping_voltage + bat.temperature_compensation * (self.bat_temperature - 25.0)
    }

    fn float_setpoint(&self, bat: &BatteryConfig) -> f32 {
        bat.float_voltage + bat.temperature_compensation * (self.bat_temperature - 25.0)
    }

    fn equalization_setpoint(&self, bat: &BatteryConfig) -> f32 {
        bat.equalization_voltage + bat.temperature_compensation * (self.bat_temperature - 25.0)
    }

    /// Full per-second update: preconditions, state machine, SoC/SOH and
    /// discharge gating. `load_shedding` is the load manager's
    /// `LOAD_SHEDDING` signal (spec §4.4).
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        now: u64,
        bus: &mut DcBus,
        port: &mut Port,
        bat: &BatteryConfig,
        errors: &mut ErrorFlags,
        load_shedding: bool,
    ) {
        self.update_soc(bus, port, bat, load_shedding);
        self.discharge_control(bus, port, bat, errors);

        // Preconditions, checked every tick regardless of state.
        if self.bat_temperature > bat.charge_temp_max {
            port.pos_current_limit = 0.0;
            errors.set(FaultKind::BatChargeOvertemp);
            self.enter_state(now, ChargerState::Idle);
        } else if self.bat_temperature < bat.charge_temp_min {
            port.pos_current_limit = 0.0;
            errors.set(FaultKind::BatChargeUndertemp);
            self.enter_state(now, ChargerState::Idle);
        }

        if errors.has(FaultKind::BatOvervoltage)
            && bus.voltage < (bat.absolute_max_voltage - 0.5) * bus.series_multiplier as f32
        {
            errors.clear(FaultKind::BatOvervoltage);
        }

        if self.state != ChargerState::Follower && now.saturating_sub(self.time_last_ctrl_msg) <= 1
        {
            self.enter_state(now, ChargerState::Follower);
        }

        match self.state {
            ChargerState::Idle => self.tick_idle(now, bus, port, bat, errors),
            ChargerState::Bulk => self.tick_bulk(now, bus, port, bat),
            ChargerState::Topping => self.tick_topping(now, bus, port, bat),
            ChargerState::Float => self.tick_float(now, bus, port, bat),
            ChargerState::Equalization => self.tick_equalization(now, bus, port, bat),
            ChargerState::Follower => self.tick_follower(now, bus, port, bat),
        }
    }

    fn tick_idle(&mut self, now: u64, bus: &mut DcBus, port: &mut Port, bat: &BatteryConfig, errors: &mut ErrorFlags) {
        let recharge_elapsed = self.time_state_changed == TIME_NEVER
            || (now.saturating_sub(self.time_state_changed) > bat.time_limit_recharge as u64
                && bus.voltage < bus.sink_control_voltage(Some(bat.recharge_voltage), port.current));

        if recharge_elapsed
            && bus.voltage > bus.sink_control_voltage(Some(bat.absolute_min_voltage), port.current)
            && self.bat_temperature < bat.charge_temp_max - 1.0
            && self.bat_temperature > bat.charge_temp_min + 1.0
        {
            bus.sink_voltage_intercept = self.topping_setpoint(bat);
            port.pos_current_limit = bat.charge_current_max;
            self.target_current_control = port.pos_current_limit;
            self.full = false;
            errors.clear(FaultKind::BatChargeOvertemp);
            errors.clear(FaultKind::BatChargeUndertemp);
            errors.clear(FaultKind::BatOvervoltage);
            self.enter_state(now, ChargerState::Bulk);
        }
    }

    fn tick_bulk(&mut self, now: u64, bus: &mut DcBus, port: &Port, bat: &BatteryConfig) {
        bus.sink_voltage_intercept = self.topping_setpoint(bat);

        if bus.voltage > bus.sink_control_voltage(None, port.current) {
            self.target_voltage_timer = 0;
            self.enter_state(now, ChargerState::Topping);
        }
    }

    fn tick_topping(&mut self, now: u64, bus: &mut DcBus, port: &mut Port, bat: &BatteryConfig) {
        bus.sink_voltage_intercept = self.topping_setpoint(bat);
        self.target_current_control = port.current_filtered();

        if bus.voltage_filtered() >= bus.sink_control_voltage(None, port.current) - 0.05 {
            if port.current_filtered() < bat.topping_cutoff_current
                || self.target_voltage_timer > bat.topping_duration as u64
            {
                self.full = true;
            }
            self.target_voltage_timer += 1;
        } else if now.saturating_sub(self.time_state_changed) > TOPPING_FALLBACK_S {
            self.enter_state(now, ChargerState::Bulk);
        }

        if self.full {
            self.num_full_charges += 1;
            self.discharged_ah = 0.0;

            let days_since_eq = now.saturating_sub(self.time_last_equalization) / (24 * 60 * 60);
            let cycles_since_eq = self.num_deep_discharges.saturating_sub(self.deep_dis_last_equalization);

            if bat.equalization_enabled
                && (days_since_eq >= bat.equalization_trigger_days as u64
                    || cycles_since_eq >= bat.equalization_trigger_deep_cycles)
            {
                bus.sink_voltage_intercept = bat.equalization_voltage;
                port.pos_current_limit = bat.equalization_current_limit;
                self.enter_state(now, ChargerState::Equalization);
            } else if bat.float_enabled {
                bus.sink_voltage_intercept = self.float_setpoint(bat);
                self.enter_state(now, ChargerState::Float);
            } else {
                port.pos_current_limit = 0.0;
                self.enter_state(now, ChargerState::Idle);
            }
        }
    }

    fn tick_float(&mut self, now: u64, bus: &mut DcBus, port: &mut Port, bat: &BatteryConfig) {
        bus.sink_voltage_intercept = self.float_setpoint(bat);
        self.target_current_control = port.current_filtered();

        if bus.voltage >= bus.sink_control_voltage(None, port.current) {
            self.time_target_voltage_reached = now;
        }

        if now.saturating_sub(self.time_target_voltage_reached) > bat.float_recharge_time as u64
            && bus.voltage_filtered() < bus.sink_control_voltage(Some(bat.recharge_voltage), port.current)
        {
            port.pos_current_limit = bat.charge_current_max;
            self.full = false;
            self.enter_state(now, ChargerState::Bulk);
        }
    }

    fn tick_equalization(&mut self, now: u64, bus: &mut DcBus, port: &mut Port, bat: &BatteryConfig) {
        bus.sink_voltage_intercept = self.equalization_setpoint(bat);
        self.target_current_control = port.current_filtered();

        if now.saturating_sub(self.time_state_changed) > bat.equalization_duration as u64 {
            self.time_last_equalization = now;
            self.deep_dis_last_equalization = self.num_deep_discharges;
            self.discharged_ah = 0.0;

            if bat.float_enabled {
                bus.sink_voltage_intercept = self.float_setpoint(bat);
                self.enter_state(now, ChargerState::Float);
            } else {
                port.pos_current_limit = 0.0;
                self.enter_state(now, ChargerState::Idle);
            }
        }
    }

    fn tick_follower(&mut self, now: u64, bus: &mut DcBus, port: &mut Port, bat: &BatteryConfig) {
        if now.saturating_sub(self.time_last_ctrl_msg) > 1 {
            port.pos_current_limit = bat.charge_current_max;
            self.enter_state(now, ChargerState::Bulk);
        } else {
            port.pos_current_limit = self.target_current_control;
            bus.sink_voltage_intercept = bat.absolute_max_voltage;
        }
    }

    /// Peer control-channel hook (spec §6.5): the transport calls this on
    /// receipt of a framed `{target_current}` message.
    pub fn on_peer_message(&mut self, now: u64, target_current: f32) {
        self.time_last_ctrl_msg = now;
        self.target_current_control = target_current;
    }
}

impl Default for Charger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::{BatteryChemistry, BatteryConfig};

    fn setup(chemistry: BatteryChemistry, cells: u32, capacity: f32) -> (Charger, DcBus, Port, BatteryConfig, ErrorFlags) {
        let bat = BatteryConfig::init(chemistry, cells, capacity);
        let mut charger = Charger::new();
        let mut bus = DcBus::new();
        let mut port = Port::new();
        charger.init_terminal(&mut bus, &mut port, &bat);
        (charger, bus, port, bat, ErrorFlags::empty())
    }

    /// S1: LFP, 4 cells, 100 Ah, idle -> bulk within the recharge timeout.
    #[test]
    fn s1_idle_to_bulk() {
        let (mut charger, mut bus, mut port, bat, mut errors) =
            setup(BatteryChemistry::Lfp, 4, 100.0);
        bus.voltage = 12.8;
        port.current = 0.0;

        for t in 0..11 {
            charger.tick(t, &mut bus, &mut port, &bat, &mut errors, false);
        }

        assert_eq!(charger.state, ChargerState::Bulk);
        assert!((bus.sink_voltage_intercept - 14.2).abs() < 1e-3);
        assert_eq!(port.pos_current_limit, 100.0);
    }

    /// S2: Flooded, 6 cells, topping -> full -> float.
    #[test]
    fn s2_topping_declares_full_and_goes_float() {
        let (mut charger, mut bus, mut port, bat, mut errors) =
            setup(BatteryChemistry::Flooded, 6, 100.0);
        charger.state = ChargerState::Topping;
        charger.time_state_changed = 0;
        bus.sink_voltage_intercept = bat.topping_voltage;
        bus.update_voltage(14.4);
        bus.voltage = 14.4;
        port.update_current(3.9);
        port.current = 3.9;

        charger.tick(100, &mut bus, &mut port, &bat, &mut errors, false);

        assert!(charger.full);
        assert_eq!(charger.num_full_charges, 1);
        assert_eq!(charger.discharged_ah, 0.0);
        assert_eq!(charger.state, ChargerState::Float);
    }

    /// S3: Follower with a stale control message returns to Bulk.
    #[test]
    fn s3_follower_falls_back_to_bulk_after_timeout() {
        let (mut charger, mut bus, mut port, bat, mut errors) =
            setup(BatteryChemistry::Lfp, 4, 100.0);
        charger.state = ChargerState::Follower;
        charger.time_last_ctrl_msg = 0;

        charger.tick(5, &mut bus, &mut port, &bat, &mut errors, false);

        assert_eq!(charger.state, ChargerState::Bulk);
        assert_eq!(port.pos_current_limit, bat.charge_current_max);
    }

    #[test]
    fn coulomb_counter_resets_on_full() {
        let (mut charger, mut bus, mut port, bat, mut errors) =
            setup(BatteryChemistry::Flooded, 6, 100.0);
        charger.state = ChargerState::Topping;
        charger.time_state_changed = 0;
        charger.discharged_ah = 42.0;
        bus.sink_voltage_intercept = bat.topping_voltage;
        bus.voltage = 14.4;
        bus.update_voltage(14.4);
        port.current = 3.9;
        port.update_current(3.9);

        charger.tick(10, &mut bus, &mut port, &bat, &mut errors, false);
        assert_eq!(charger.discharged_ah, 0.0);
    }

    #[test]
    fn empty_latch_clears_on_voltage_hysteresis_not_on_shedding_clear() {
        let (mut charger, mut bus, mut port, bat, mut errors) =
            setup(BatteryChemistry::Lfp, 4, 100.0);
        port.neg_current_limit = -bat.discharge_current_max;
        port.current = -1.0;
        bus.voltage = 9.0; // well below the reconnect threshold

        charger.tick(0, &mut bus, &mut port, &bat, &mut errors, true);
        assert!(charger.empty);
        assert_eq!(charger.num_deep_discharges, 1);

        // Clearing the load-shedding flag alone must NOT clear `empty`; only
        // the hysteresis-on-voltage rule does (open question decision).
        charger.tick(1, &mut bus, &mut port, &bat, &mut errors, false);
        assert!(charger.empty);

        // Voltage recovering above the reconnect threshold clears it.
        bus.voltage = bat.load_reconnect_voltage + 1.0;
        charger.tick(2, &mut bus, &mut port, &bat, &mut errors, false);
        assert!(!charger.empty);
    }

    #[test]
    fn peer_message_enters_follower_mode() {
        let (mut charger, mut bus, mut port, bat, mut errors) =
            setup(BatteryChemistry::Lfp, 4, 100.0);
        charger.on_peer_message(10, 5.0);
        charger.tick(10, &mut bus, &mut port, &bat, &mut errors, false);
        assert_eq!(charger.state, ChargerState::Follower);
        assert_eq!(port.pos_current_limit, 5.0);
    }
}
