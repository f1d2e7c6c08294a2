//! PWM shunt switch control, for board variants with a single charging
//! MOSFET instead of a full buck/boost converter.
//!
//! Grounded on `PwmSwitch::control`/`emergency_stop` in the original
//! firmware. Simpler than [`super::Dcdc`]: there is no inductor current to
//! regulate, just a duty cycle that either ramps toward 100% (fully on) or
//! backs off when a limit is hit, with a hard on/off hysteresis band at the
//! extremes to avoid dwelling on very short pulses the gate driver can't
//! resolve.

use crate::bus::{DcBus, Port};

const RESTART_INTERVAL_S: u64 = 60;
const START_VOLTAGE_OFFSET_V: f32 = 2.0;
const LS_VOLTAGE_MIN_V: f32 = 9.0;
const DUTY_STEP: f32 = 1.0 / 256.0;

pub struct PwmSwitch {
    pub enabled: bool,
    active: bool,
    duty_cycle: f32,
    off_at: u64,
}

impl PwmSwitch {
    pub fn new() -> Self {
        Self {
            enabled: true,
            active: false,
            duty_cycle: 0.0,
            off_at: 0,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn duty_cycle(&self) -> f32 {
        self.duty_cycle
    }

    /// `terminal` is the solar-facing side, `port_int` the battery-facing
    /// side the switch regulates.
    pub fn control(&mut self, now: u64, terminal: &DcBus, terminal_port: &Port, port_int: &DcBus, port_int_port: &mut Port) {
        if self.active {
            if port_int_port.pos_current_limit == 0.0
                || terminal_port.neg_current_limit == 0.0
                || terminal_port.current > 0.0
                || port_int.voltage < LS_VOLTAGE_MIN_V
                || !self.enabled
            {
                self.stop(now);
                debug!("pwm switch stop");
            } else if port_int.voltage > port_int.sink_control_voltage(None, port_int_port.current)
                || port_int_port.current > port_int_port.pos_current_limit
                || terminal_port.current < terminal_port.neg_current_limit
            {
                if self.duty_cycle > 0.95 {
                    self.duty_cycle = 0.95;
                } else if self.duty_cycle < 0.05 {
                    self.stop(now);
                    debug!("pwm switch stop, no further derating possible");
                } else {
                    self.duty_cycle -= DUTY_STEP;
                }
            } else if self.duty_cycle > 0.95 {
                self.duty_cycle = 1.0;
            } else {
                self.duty_cycle += DUTY_STEP;
            }
        } else if port_int_port.pos_current_limit > 0.0
            && port_int.voltage < port_int.sink_control_voltage(None, port_int_port.current)
            && port_int.voltage > LS_VOLTAGE_MIN_V
            && terminal_port.neg_current_limit < 0.0
            && terminal.voltage > port_int.voltage + START_VOLTAGE_OFFSET_V
            && now > self.off_at + RESTART_INTERVAL_S
            && self.enabled
        {
            self.duty_cycle = 1.0;
            self.active = true;
            debug!("pwm switch start");
        }
    }

    /// Fast-stop bypassing the control loop, for ISR-driven protection
    /// trips. The switch restarts automatically from [`Self::control`] once
    /// conditions are valid again.
    pub fn emergency_stop(&mut self, now: u64) {
        self.stop(now);
    }

    fn stop(&mut self, now: u64) {
        self.active = false;
        self.duty_cycle = 0.0;
        self.off_at = now;
    }
}

impl Default for PwmSwitch {
    fn default() -> Self {
        Self::new()
    }
}
