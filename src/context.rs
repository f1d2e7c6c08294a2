//! Controller context: the explicit, test-instantiable alternative to the
//! original firmware's process-wide singletons (spec §9 "Global mutable
//! state" redesign note). One `ControllerContext` per physical device;
//! tests build as many as they need.
//!
//! Owns every component and threads them through the slow tick in the
//! order §9's "cyclic coupling" note calls for: charger before power
//! stage, so the charger's freshly-computed setpoints are what the power
//! stage regulates against this tick.

use crate::battery::BatteryConfig;
use crate::bus::{DcBus, Port};
use crate::charger::Charger;
use crate::error::FaultKind;
use crate::load::LoadOutput;
use crate::persist;
use crate::power_stage::Dcdc;
use crate::status::{DeviceStatus, ErrorFlags};

/// Solar-facing bus/port pair.
pub struct SolarTerminal {
    pub bus: DcBus,
    pub port: Port,
}

/// Battery-facing bus/port pair.
pub struct BatteryTerminal {
    pub bus: DcBus,
    pub port: Port,
}

/// Load-facing bus/port pair.
pub struct LoadTerminal {
    pub bus: DcBus,
    pub port: Port,
}

pub struct ControllerContext {
    pub solar: SolarTerminal,
    pub battery: BatteryTerminal,
    pub load: LoadTerminal,

    pub battery_config: BatteryConfig,
    /// Writable copy for the external interface (spec §3.2). Validated and
    /// copied into `battery_config` on [`Self::commit_battery_config`];
    /// copied back from `battery_config` if validation fails.
    pub staging_battery_config: BatteryConfig,
    pub charger: Charger,
    pub dcdc: Dcdc,
    pub load_output: LoadOutput,
    pub status: DeviceStatus,
    pub errors: ErrorFlags,

    /// Set when the persistent store has changes to flush, either from a
    /// successful config commit or the periodic save-due check. Cleared by
    /// whatever drives the `hal` store transport once it has written.
    pub persist_pending: bool,
}

impl ControllerContext {
    pub fn new(battery_config: BatteryConfig, dcdc_inductor_current_max: f32, dcdc_hs_voltage_max: f32, dcdc_ls_voltage_max: f32) -> Self {
        let mut battery = BatteryTerminal { bus: DcBus::new(), port: Port::new() };
        let charger = Charger::new();
        charger.init_terminal(&mut battery.bus, &mut battery.port, &battery_config);

        Self {
            solar: SolarTerminal { bus: DcBus::new(), port: Port::new() },
            battery,
            load: LoadTerminal { bus: DcBus::new(), port: Port::new() },
            battery_config,
            staging_battery_config: battery_config,
            charger,
            dcdc: Dcdc::new(dcdc_inductor_current_max, dcdc_hs_voltage_max, dcdc_ls_voltage_max, 85.0),
            load_output: LoadOutput::new(battery_config.discharge_current_max, battery_config.internal_resistance),
            status: DeviceStatus::new(),
            errors: ErrorFlags::empty(),
            persist_pending: false,
        }
    }

    /// Validates `staging_battery_config` and, on success, makes it active
    /// (resetting the coulomb counter/usable capacity/SOH whenever the
    /// nominal capacity changed, spec §3.2, S6) and enqueues a persist. On
    /// failure, copies the active config back into staging so a rejected
    /// edit doesn't linger half-applied (spec §3.2).
    pub fn commit_battery_config(&mut self) -> Result<(), FaultKind> {
        if !self.staging_battery_config.validate() {
            self.staging_battery_config = self.battery_config;
            return Err(FaultKind::ConfigInvalid);
        }

        if crate::battery::overwrite(&self.staging_battery_config, &mut self.battery_config) {
            self.charger.discharged_ah = 0.0;
            self.charger.usable_capacity = 0.0;
            self.charger.soh = 0.0;
        }

        self.charger.init_terminal(&mut self.battery.bus, &mut self.battery.port, &self.battery_config);
        self.persist_pending = true;
        Ok(())
    }

    /// One second of control: charger first, then load output and
    /// device-status accounting.
    pub fn tick_slow(&mut self, now: u64) {
        let load_shedding = !self.load_output.is_on() && self.load_output.state == crate::load::LoadState::OffLowSoc;

        self.charger.tick(now, &mut self.battery.bus, &mut self.battery.port, &self.battery_config, &mut self.errors, load_shedding);

        self.load_output.tick_slow(
            now,
            &mut self.load.port,
            self.load.bus.voltage,
            self.battery_config.load_disconnect_voltage,
            self.battery_config.load_reconnect_voltage,
            self.battery_config.absolute_max_voltage,
            self.status.internal_temp,
            &mut self.errors,
        );

        if self.errors.has(FaultKind::DcdcHsMosfetShort) {
            self.dcdc.fuse_destruction();
        }

        if persist::update_due(now) {
            self.persist_pending = true;
        }

        self.battery.port.energy_balance(self.battery.bus.voltage);
        self.solar.port.energy_balance(self.solar.bus.voltage);
        self.load.port.energy_balance(self.load.bus.voltage);

        self.status.update_energy(
            self.solar.bus.voltage,
            self.battery.bus.voltage,
            self.battery.port.pos_energy_wh,
            self.battery.port.neg_energy_wh,
            self.solar.port.neg_energy_wh,
            self.load.port.pos_energy_wh,
        );

        self.status.update_min_max(
            self.battery.bus.voltage,
            self.solar.bus.voltage,
            self.battery.port.current,
            self.load.port.current,
            self.solar.port.current * self.solar.bus.voltage,
            self.load.port.current * self.load.bus.voltage,
            self.charger.bat_temperature,
            self.dcdc.temp_mosfets,
        );

        self.status.error_flags = self.errors;
    }

    /// Runs at the fast-tick rate (§5): power-stage P&O and the load's
    /// short-circuit backstop.
    pub fn tick_fast(&mut self, now: u64) {
        let bat_voltage_fault = self.errors.has(FaultKind::BatOvervoltage) || self.errors.has(FaultKind::BatUndervoltage);
        let short_detected = self.dcdc.control(now, &self.solar.bus, &mut self.solar.port, &self.battery.bus, &mut self.battery.port, bat_voltage_fault);
        if short_detected.is_some() {
            self.errors.set(FaultKind::DcdcHsMosfetShort);
        }

        self.load_output.tick_fast(now, &mut self.load.port, &mut self.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::BatteryChemistry;

    #[test]
    fn slow_tick_moves_idle_charger_toward_bulk() {
        let bat = BatteryConfig::init(BatteryChemistry::Lfp, 4, 100.0);
        let mut ctx = ControllerContext::new(bat, 20.0, 30.0, 20.0);
        ctx.battery.bus.voltage = 12.8;

        for t in 0..11 {
            ctx.tick_slow(t);
        }

        assert_eq!(ctx.charger.state, crate::charger::ChargerState::Bulk);
    }

    #[test]
    fn commit_rejects_invalid_config_and_restores_staging() {
        let bat = BatteryConfig::init(BatteryChemistry::Lfp, 4, 100.0);
        let mut ctx = ControllerContext::new(bat, 20.0, 30.0, 20.0);

        ctx.staging_battery_config.load_reconnect_voltage = ctx.staging_battery_config.load_disconnect_voltage;
        assert_eq!(ctx.commit_battery_config(), Err(FaultKind::ConfigInvalid));
        assert_eq!(ctx.staging_battery_config, ctx.battery_config);
        assert!(!ctx.persist_pending);
    }

    #[test]
    fn commit_resets_coulomb_counters_on_capacity_change_and_enqueues_persist() {
        let bat = BatteryConfig::init(BatteryChemistry::Lfp, 4, 100.0);
        let mut ctx = ControllerContext::new(bat, 20.0, 30.0, 20.0);
        ctx.charger.discharged_ah = 42.0;
        ctx.charger.usable_capacity = 80.0;
        ctx.charger.soh = 80.0;

        ctx.staging_battery_config.nominal_capacity = 120.0;
        ctx.staging_battery_config.charge_current_max = 120.0;
        ctx.staging_battery_config.discharge_current_max = 120.0;

        ctx.commit_battery_config().unwrap();
        assert_eq!(ctx.charger.discharged_ah, 0.0);
        assert_eq!(ctx.charger.usable_capacity, 0.0);
        assert_eq!(ctx.charger.soh, 0.0);
        assert_eq!(ctx.battery_config.nominal_capacity, 120.0);
        assert!(ctx.persist_pending);
    }

    #[test]
    fn dcdc_hs_mosfet_short_sets_fault_and_triggers_fuse_destruction() {
        let bat = BatteryConfig::init(BatteryChemistry::Lfp, 4, 100.0);
        let mut ctx = ControllerContext::new(bat, 20.0, 30.0, 20.0);
        ctx.errors.set(FaultKind::DcdcHsMosfetShort);

        let before = ctx.dcdc.is_running();
        for t in 0..30 {
            ctx.tick_slow(t);
        }
        assert_ne!(before, ctx.dcdc.is_running());
    }
}
