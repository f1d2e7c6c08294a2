//! Load output control (Component E): the switched battery-backed output
//! (and, on boards that have one, a USB output gated by the same low-SOC
//! cutoff) with thermal, current-compensated LVD, overvoltage and
//! short-circuit protection.
//!
//! Grounded on `load_state_machine`/`usb_state_machine`/`load_control` in
//! the original firmware, with the LVD compensation and `lvd_recovery_delay`
//! field from `load.h`'s newer `LoadOutput` class. Per spec §4.6, the state
//! machine, thermal model, and overvoltage debounce all run once a second;
//! [`LoadOutput::tick_fast`] keeps only the short-circuit magnitude check, a
//! software backstop for the hardware comparator path spec §4.6 point 6
//! describes.

use crate::bus::Port;
use crate::error::FaultKind;
use crate::status::ErrorFlags;

const MOSFET_MAX_JUNCTION_TEMP_C: f32 = 120.0;
const MOSFET_THERMAL_TIME_CONSTANT_S: f32 = 5.0;
const OVERCURRENT_RECOVERY_S: u64 = 30 * 60;
const OVERVOLTAGE_DEBOUNCE_S: u32 = 1;
const SHORT_CIRCUIT_RECOVERY_S: u64 = 60;
const DEFAULT_LVD_RECOVERY_S: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Disabled,
    On,
    OffLowSoc,
    OffOvercurrent,
    OffOvervoltage,
    OffShortCircuit,
    OffTemperature,
}

pub struct LoadOutput {
    pub state: LoadState,
    pub usb_state: LoadState,

    /// Target setting from the communication port; overruled whenever the
    /// battery is empty or a protection trip is active.
    pub enabled: bool,
    pub usb_enabled: bool,

    pub junction_temperature: f32,
    pub current_max: f32,

    /// Used to current-compensate the LVD/LVR thresholds (spec §4.6 point
    /// 3), so a loaded terminal doesn't trip disconnect on its own IR drop.
    pub internal_resistance: f32,
    /// Seconds an LVD trip must hold before the output may reconnect, even
    /// if bus voltage recovers sooner (spec §3.5, scenario S5).
    pub lvd_recovery_delay: u64,

    overcurrent_at: u64,
    short_circuit_at: u64,
    lvd_at: u64,
    overvoltage_debounce: u32,
}

impl LoadOutput {
    pub fn new(current_max: f32, internal_resistance: f32) -> Self {
        Self {
            state: LoadState::Disabled,
            usb_state: LoadState::Disabled,
            enabled: true,
            usb_enabled: true,
            junction_temperature: 25.0,
            current_max,
            internal_resistance,
            lvd_recovery_delay: DEFAULT_LVD_RECOVERY_S,
            overcurrent_at: 0,
            short_circuit_at: 0,
            lvd_at: 0,
            overvoltage_debounce: 0,
        }
    }

    /// Called once a second: state machine, current-compensated LVD,
    /// thermal model, and overvoltage debounce (spec §4.6 points 1-3).
    /// `bus_voltage`/`port` are the load terminal's own bus voltage and
    /// port, not the battery's — the LVD threshold is compensated against
    /// whatever is actually loading this terminal.
    #[allow(clippy::too_many_arguments)]
    pub fn tick_slow(
        &mut self,
        now: u64,
        port: &mut Port,
        bus_voltage: f32,
        disconnect_voltage: f32,
        reconnect_voltage: f32,
        overvoltage_max: f32,
        mcu_temp: f32,
        errors: &mut ErrorFlags,
    ) {
        let off_threshold = disconnect_voltage + port.current * self.internal_resistance;
        let on_threshold = reconnect_voltage + port.current * self.internal_resistance;

        self.state = match self.state {
            LoadState::Disabled if bus_voltage >= off_threshold && self.enabled => LoadState::On,
            LoadState::On if !self.enabled => LoadState::Disabled,
            LoadState::On if bus_voltage < off_threshold => {
                self.lvd_at = now;
                errors.set(FaultKind::LoadShedding);
                LoadState::OffLowSoc
            }
            LoadState::OffLowSoc if bus_voltage >= on_threshold && now > self.lvd_at + self.lvd_recovery_delay => {
                errors.clear(FaultKind::LoadShedding);
                if self.enabled {
                    LoadState::On
                } else {
                    LoadState::Disabled
                }
            }
            LoadState::OffOvercurrent if now > self.overcurrent_at + OVERCURRENT_RECOVERY_S => {
                errors.clear(FaultKind::LoadOvercurrent);
                LoadState::Disabled
            }
            LoadState::OffShortCircuit if now > self.short_circuit_at + SHORT_CIRCUIT_RECOVERY_S => {
                errors.clear(FaultKind::LoadShortCircuit);
                LoadState::Disabled
            }
            LoadState::OffOvervoltage if bus_voltage < overvoltage_max => {
                errors.clear(FaultKind::LoadOvervoltage);
                LoadState::Disabled
            }
            other => other,
        };

        self.usb_state = match self.usb_state {
            LoadState::Disabled if self.usb_enabled => LoadState::On,
            LoadState::On if self.state == LoadState::OffLowSoc => LoadState::OffLowSoc,
            LoadState::On if self.state == LoadState::OffOvercurrent => LoadState::OffOvercurrent,
            LoadState::On if !self.usb_enabled => LoadState::Disabled,
            LoadState::OffLowSoc if self.state == LoadState::On => {
                if self.usb_enabled {
                    LoadState::On
                } else {
                    LoadState::Disabled
                }
            }
            LoadState::OffOvercurrent if self.state != LoadState::OffOvercurrent => LoadState::Disabled,
            other => other,
        };

        // Thermal model, folded for a 1 Hz caller (control_freq_hz == 1.0
        // in the original's terms).
        self.junction_temperature += (mcu_temp - self.junction_temperature
            + port.current * port.current / (self.current_max * self.current_max) * (MOSFET_MAX_JUNCTION_TEMP_C - 25.0))
            / MOSFET_THERMAL_TIME_CONSTANT_S;

        if self.junction_temperature > MOSFET_MAX_JUNCTION_TEMP_C {
            self.state = LoadState::OffOvercurrent;
            self.usb_state = LoadState::OffOvercurrent;
            self.overcurrent_at = now;
            port.pos_current_limit = 0.0;
            errors.set(FaultKind::LoadOvercurrent);
        }

        // Overvoltage must hold for more than one second continuously.
        if bus_voltage > overvoltage_max {
            self.overvoltage_debounce += 1;
            if self.overvoltage_debounce > OVERVOLTAGE_DEBOUNCE_S {
                self.state = LoadState::OffOvervoltage;
                self.usb_state = LoadState::OffOvervoltage;
                errors.set(FaultKind::LoadOvervoltage);
            }
        } else {
            self.overvoltage_debounce = 0;
        }
    }

    /// Runs at the fast-tick rate: a software short-circuit backstop for
    /// the hardware comparator path (spec §4.6 point 6).
    pub fn tick_fast(&mut self, now: u64, port: &mut Port, errors: &mut ErrorFlags) {
        if port.current.abs() > self.current_max * 2.0 {
            self.state = LoadState::OffShortCircuit;
            self.usb_state = LoadState::OffShortCircuit;
            self.short_circuit_at = now;
            port.pos_current_limit = 0.0;
            errors.set(FaultKind::LoadShortCircuit);
        }
    }

    /// Fast-stop bypassing the state machine, for ISR-driven protection
    /// trips. The output restarts automatically from [`Self::tick_slow`]
    /// once conditions recover.
    pub fn emergency_stop(&mut self, next_state: LoadState) {
        self.state = next_state;
        self.usb_state = next_state;
    }

    pub fn is_on(&self) -> bool {
        self.state == LoadState::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_on_when_voltage_above_disconnect_and_target_on() {
        let mut load = LoadOutput::new(10.0, 0.01);
        let mut port = Port::new();
        let mut errors = ErrorFlags::empty();
        load.tick_slow(0, &mut port, 12.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        assert!(load.is_on());
    }

    #[test]
    fn low_voltage_trips_lvd_and_sets_load_shedding() {
        let mut load = LoadOutput::new(10.0, 0.01);
        let mut port = Port::new();
        let mut errors = ErrorFlags::empty();
        load.tick_slow(0, &mut port, 12.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        load.tick_slow(1, &mut port, 10.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        assert_eq!(load.state, LoadState::OffLowSoc);
        assert!(!load.is_on());
        assert!(errors.has(FaultKind::LoadShedding));
    }

    #[test]
    fn lvd_recovery_waits_out_the_full_delay_even_if_voltage_recovers() {
        let mut load = LoadOutput::new(10.0, 0.01);
        load.lvd_recovery_delay = 30;
        let mut port = Port::new();
        let mut errors = ErrorFlags::empty();
        load.tick_slow(0, &mut port, 12.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        load.tick_slow(1, &mut port, 10.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        assert_eq!(load.state, LoadState::OffLowSoc);

        // Voltage recovers above the reconnect threshold right away, but
        // the recovery delay hasn't elapsed yet.
        load.tick_slow(5, &mut port, 12.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        assert_eq!(load.state, LoadState::OffLowSoc);

        load.tick_slow(1 + 30 + 1, &mut port, 12.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        assert_eq!(load.state, LoadState::On);
        assert!(!errors.has(FaultKind::LoadShedding));
    }

    #[test]
    fn overcurrent_recovers_after_delay() {
        let mut load = LoadOutput::new(10.0, 0.01);
        load.state = LoadState::OffOvercurrent;
        load.overcurrent_at = 0;
        let mut port = Port::new();
        let mut errors = ErrorFlags::empty();
        load.tick_slow(10, &mut port, 12.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        assert_eq!(load.state, LoadState::OffOvercurrent);
        load.tick_slow(OVERCURRENT_RECOVERY_S + 1, &mut port, 12.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        assert_eq!(load.state, LoadState::Disabled);
    }

    #[test]
    fn thermal_model_trips_overcurrent_protection() {
        let mut load = LoadOutput::new(10.0, 0.01);
        let mut port = Port::new();
        port.current = 30.0;
        let mut errors = ErrorFlags::empty();
        for t in 0..200 {
            load.tick_slow(t, &mut port, 12.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        }
        assert_eq!(load.state, LoadState::OffOvercurrent);
        assert_eq!(port.pos_current_limit, 0.0);
        assert!(errors.has(FaultKind::LoadOvercurrent));
    }

    #[test]
    fn short_circuit_trips_immediately_at_fast_tick_rate() {
        let mut load = LoadOutput::new(10.0, 0.01);
        let mut port = Port::new();
        port.current = 25.0;
        let mut errors = ErrorFlags::empty();
        load.tick_fast(5, &mut port, &mut errors);
        assert_eq!(load.state, LoadState::OffShortCircuit);
        assert!(errors.has(FaultKind::LoadShortCircuit));
    }

    #[test]
    fn overvoltage_trips_only_after_one_second() {
        let mut load = LoadOutput::new(10.0, 0.01);
        let mut port = Port::new();
        let mut errors = ErrorFlags::empty();
        load.tick_slow(0, &mut port, 16.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        assert_ne!(load.state, LoadState::OffOvervoltage);
        load.tick_slow(1, &mut port, 16.0, 10.5, 11.0, 15.0, 25.0, &mut errors);
        assert_eq!(load.state, LoadState::OffOvervoltage);
        assert!(errors.has(FaultKind::LoadOvervoltage));
    }
}
