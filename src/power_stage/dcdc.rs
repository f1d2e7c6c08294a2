//! Synchronous buck/boost DC/DC converter control.
//!
//! Grounded on `Dcdc::perturb_observe_buck`/`perturb_observe_boost`/
//! `check_start_conditions`/`check_hs_mosfet_short`/`startup_inhibit`/
//! `control`/`stop`/`fuse_destruction` in the original firmware. The duty
//! cycle here is a unitless `0.0..=1.0` fraction rather than a timer CCR
//! register value; stepping it is the fast tick's job, actually driving a
//! half-bridge peripheral from it is left to whatever [`crate::hal`]
//! implementation the board provides.

use crate::bus::{DcBus, Port};

/// Minimum output power, in watts, below which the converter is considered
/// idle and will shut down after [`LOW_POWER_TIMEOUT_S`].
const OUTPUT_POWER_MIN_W: f32 = 1.0;
const LOW_POWER_TIMEOUT_S: u64 = 10;
const RESTART_INTERVAL_S: u64 = 60;
const STARTUP_INHIBIT_S: u64 = 1;
const HS_MOSFET_SHORT_LATCH_S: u64 = 10;
const FUSE_DESTRUCTION_GRACE_S: u32 = 20;
const DUTY_STEP: f32 = 0.002;
const LS_VOLTAGE_MIN_V: f32 = 9.0;

/// Which side of the converter is allowed to source power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcdcMode {
    Off,
    Buck,
    Boost,
    /// Bidirectional (nanogrid) operation: the converter picks buck or
    /// boost per tick from whichever side has positive inductor current.
    Auto,
}

/// What limit the control loop is currently regulating against, for
/// telemetry and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcdcState {
    Off,
    Mppt,
    CvHighSide,
    CvLowSide,
    CcHighSide,
    CcLowSide,
    Derating,
}

/// A synchronous DC/DC converter between a high-voltage terminal (solar
/// input in the common charge-controller configuration) and a low-voltage
/// terminal (battery).
pub struct Dcdc {
    pub enabled: bool,
    pub mode: DcdcMode,
    pub state: DcdcState,

    pub inductor_current: f32,
    pub inductor_current_max: f32,
    pub hs_voltage_max: f32,
    pub ls_voltage_max: f32,
    pub temp_mosfets: f32,
    pub mosfets_max_temp: f32,

    half_bridge_enabled: bool,
    duty_cycle: f32,
    pwm_direction: i8,
    power_prev: f32,

    power_good_at: u64,
    off_at: u64,
    inhibit_start: Option<u64>,
    hs_mosfet_short_first_seen: Option<u64>,
    fuse_destruction_counter: u32,
}

impl Dcdc {
    pub fn new(inductor_current_max: f32, hs_voltage_max: f32, ls_voltage_max: f32, mosfets_max_temp: f32) -> Self {
        Self {
            enabled: true,
            mode: DcdcMode::Buck,
            state: DcdcState::Off,
            inductor_current: 0.0,
            inductor_current_max,
            hs_voltage_max,
            ls_voltage_max,
            temp_mosfets: 25.0,
            mosfets_max_temp,
            half_bridge_enabled: false,
            duty_cycle: 0.0,
            pwm_direction: 0,
            power_prev: 0.0,
            power_good_at: 0,
            off_at: 0,
            inhibit_start: None,
            hs_mosfet_short_first_seen: None,
            fuse_destruction_counter: 0,
        }
    }

    pub fn duty_cycle(&self) -> f32 {
        self.duty_cycle
    }

    pub fn is_running(&self) -> bool {
        self.half_bridge_enabled
    }

    /// `hv` is the high-side terminal (bus + port), `lv` the low-side.
    /// `power` is the instantaneous `hv.current * hv.voltage` flowing into
    /// the converter, positive when the high side sources power.
    fn perturb_observe_buck(&mut self, now: u64, hv: (&DcBus, &Port), lv: (&DcBus, &Port), power: f32) {
        let (hvb, hvp) = hv;
        let (lvb, lvp) = lv;

        if power >= OUTPUT_POWER_MIN_W {
            self.power_good_at = now;
        }

        if (now.saturating_sub(self.power_good_at) > LOW_POWER_TIMEOUT_S || power < -10.0) && self.mode != DcdcMode::Auto {
            self.pwm_direction = 0;
        } else if lvb.voltage > lvb.sink_control_voltage(None, lvp.current) {
            self.state = DcdcState::CvLowSide;
            self.pwm_direction = -1;
        } else if lvp.pos_current_margin() < 0.0 || self.inductor_current > self.inductor_current_max {
            self.state = DcdcState::CcLowSide;
            self.pwm_direction = -1;
        } else if hvp.neg_current_margin() > 0.0 {
            self.state = DcdcState::CcHighSide;
            self.pwm_direction = -1;
        } else if hvb.voltage < hvb.src_control_voltage(None, hvp.current) && power > OUTPUT_POWER_MIN_W {
            self.state = DcdcState::CvHighSide;
            self.pwm_direction = -1;
        } else if self.temp_mosfets > self.mosfets_max_temp {
            self.state = DcdcState::Derating;
            self.pwm_direction = -1;
        } else if power < OUTPUT_POWER_MIN_W && lvb.voltage < lvb.src_control_voltage(None, lvp.current) {
            self.pwm_direction = 1;
        } else {
            self.state = DcdcState::Mppt;
            if self.power_prev > power {
                self.pwm_direction = -self.pwm_direction;
            }
        }

        self.power_prev = power;
    }

    fn perturb_observe_boost(&mut self, now: u64, hv: (&DcBus, &Port), lv: (&DcBus, &Port), power: f32) {
        let (hvb, hvp) = hv;
        let (lvb, lvp) = lv;

        if -power >= OUTPUT_POWER_MIN_W {
            self.power_good_at = now;
        }

        if (now.saturating_sub(self.power_good_at) > LOW_POWER_TIMEOUT_S || -power < -10.0) && self.mode != DcdcMode::Auto {
            self.pwm_direction = 0;
        } else if hvb.voltage > hvb.sink_control_voltage(None, hvp.current) {
            self.state = DcdcState::CvHighSide;
            self.pwm_direction = 1;
        } else if hvp.pos_current_margin() < 0.0 {
            self.state = DcdcState::CcHighSide;
            self.pwm_direction = 1;
        } else if lvp.neg_current_margin() > 0.0 || -self.inductor_current > self.inductor_current_max {
            self.state = DcdcState::CcLowSide;
            self.pwm_direction = 1;
        } else if lvb.voltage < lvb.src_control_voltage(None, lvp.current) && -power > OUTPUT_POWER_MIN_W {
            self.state = DcdcState::CvLowSide;
            self.pwm_direction = 1;
        } else if self.temp_mosfets > self.mosfets_max_temp {
            self.state = DcdcState::Derating;
            self.pwm_direction = 1;
        } else if -power < OUTPUT_POWER_MIN_W && hvb.voltage < hvb.src_control_voltage(None, hvp.current) {
            self.pwm_direction = -1;
        } else {
            self.state = DcdcState::Mppt;
            if -self.power_prev > -power {
                self.pwm_direction = -self.pwm_direction;
            }
        }

        self.power_prev = power;
    }

    /// Which mode is presently eligible to start, or [`DcdcMode::Off`] if
    /// none of the start conditions hold.
    fn check_start_conditions(&self, now: u64, hv: (&DcBus, &Port), lv: (&DcBus, &Port), bat_voltage_fault: bool) -> DcdcMode {
        let (hvb, hvp) = hv;
        let (lvb, lvp) = lv;

        if !self.enabled
            || hvb.voltage > self.hs_voltage_max
            || lvb.voltage > self.ls_voltage_max
            || lvb.voltage < LS_VOLTAGE_MIN_V
            || bat_voltage_fault
            || now < self.off_at + RESTART_INTERVAL_S
        {
            return DcdcMode::Off;
        }

        if lvp.pos_current_margin() > 0.0
            && lvb.voltage < lvb.sink_control_voltage(None, lvp.current)
            && hvp.neg_current_margin() < 0.0
            && hvb.voltage > hvb.src_control_voltage(None, hvp.current)
            && hvb.voltage * 0.85 > lvb.voltage
        {
            return DcdcMode::Buck;
        }

        if hvp.pos_current_margin() > 0.0
            && hvb.voltage < hvb.sink_control_voltage(None, hvp.current)
            && lvp.neg_current_margin() < 0.0
            && lvb.voltage > lvb.src_control_voltage(None, lvp.current)
        {
            return DcdcMode::Boost;
        }

        DcdcMode::Off
    }

    /// Latches a high-side MOSFET short if inductor current keeps flowing
    /// for more than [`HS_MOSFET_SHORT_LATCH_S`] while the half bridge is
    /// reported off. Returns `true` once latched.
    fn check_hs_mosfet_short(&mut self, now: u64, lv_voltage_filtered: f32, lv_sink_control_voltage: f32) -> bool {
        if !self.half_bridge_enabled && self.inductor_current > 0.5 && lv_voltage_filtered > lv_sink_control_voltage {
            let first_seen = *self.hs_mosfet_short_first_seen.get_or_insert(now);
            first_seen != now && now.saturating_sub(first_seen) > HS_MOSFET_SHORT_LATCH_S
        } else {
            self.hs_mosfet_short_first_seen = None;
            false
        }
    }

    fn startup_inhibit(&mut self, now: u64, reset: bool) -> bool {
        if reset {
            self.inhibit_start = Some(now);
            return true;
        }
        match self.inhibit_start {
            Some(start) => now < start + STARTUP_INHIBIT_S,
            None => false,
        }
    }

    /// Main fast-tick entry point. `bat_voltage_fault` should reflect
    /// whether [`crate::error::FaultKind::BatOvervoltage`] or
    /// [`crate::error::FaultKind::BatUndervoltage`] is currently latched.
    #[allow(clippy::too_many_arguments)]
    pub fn control(&mut self, now: u64, hvb: &DcBus, hvp: &mut Port, lvb: &DcBus, lvp: &mut Port, bat_voltage_fault: bool) -> Option<&'static str> {
        if !self.half_bridge_enabled {
            if self.check_hs_mosfet_short(now, lvb.voltage_filtered(), lvb.sink_control_voltage(None, lvp.current)) {
                return Some("high-side MOSFET short detected");
            }

            let startup_mode = self.check_start_conditions(now, (hvb, hvp), (lvb, lvp), bat_voltage_fault);

            let allowed = (startup_mode == DcdcMode::Buck && self.mode == DcdcMode::Buck)
                || (startup_mode == DcdcMode::Boost && self.mode == DcdcMode::Boost)
                || (startup_mode != DcdcMode::Off && self.mode == DcdcMode::Auto);

            if allowed {
                if self.startup_inhibit(now, false) {
                    return None;
                }

                self.duty_cycle = match startup_mode {
                    DcdcMode::Buck => {
                        self.pwm_direction = 1;
                        lvb.voltage / (hvb.voltage - 1.0)
                    }
                    _ => {
                        self.pwm_direction = -1;
                        lvb.voltage / (hvb.voltage + 1.0)
                    }
                }
                .clamp(0.0, 1.0);

                self.half_bridge_enabled = true;
                self.power_good_at = now;
                debug!("dcdc start, hv={} lv={} duty={}", hvb.voltage, lvb.voltage, self.duty_cycle);
            } else {
                self.startup_inhibit(now, true);
            }
            return None;
        }

        let mut stop_reason = None;
        if lvb.voltage > self.ls_voltage_max || hvb.voltage > self.hs_voltage_max {
            stop_reason = Some("emergency: voltage limits exceeded");
        } else if !self.enabled {
            stop_reason = Some("disabled");
        } else {
            let power = hvp.current * hvb.voltage;
            if self.mode == DcdcMode::Buck || (self.mode == DcdcMode::Auto && self.inductor_current > 0.1) {
                self.perturb_observe_buck(now, (hvb, hvp), (lvb, lvp), power);
            } else {
                self.perturb_observe_boost(now, (hvb, hvp), (lvb, lvp), power);
            }

            if self.pwm_direction != 0 {
                self.duty_cycle = (self.duty_cycle + self.pwm_direction as f32 * DUTY_STEP).clamp(0.0, 1.0);
            } else {
                stop_reason = Some("low power");
            }
        }

        if let Some(reason) = stop_reason {
            self.stop(now);
            debug!("dcdc stop: {}", reason);
        }

        None
    }

    pub fn stop(&mut self, now: u64) {
        self.half_bridge_enabled = false;
        self.duty_cycle = 0.0;
        self.state = DcdcState::Off;
        self.off_at = now;
    }

    /// Called once per slow tick while a destructive fuse-blow fault is
    /// latched. Waits [`FUSE_DESTRUCTION_GRACE_S`] ticks (to allow telemetry
    /// to flush) before commanding the converter to a duty cycle outside its
    /// safe operating area, deliberately destroying the protective fuse.
    pub fn fuse_destruction(&mut self) -> bool {
        self.fuse_destruction_counter += 1;
        if self.fuse_destruction_counter > FUSE_DESTRUCTION_GRACE_S {
            self.half_bridge_enabled = true;
            self.duty_cycle = 0.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hv_lv() -> (DcBus, Port, DcBus, Port) {
        let mut hvb = DcBus::new();
        hvb.src_voltage_intercept = 14.0;
        hvb.voltage = 20.0;
        let mut hvp = Port::new();
        hvp.neg_current_limit = -10.0;

        let mut lvb = DcBus::new();
        lvb.sink_voltage_intercept = 14.4;
        lvb.voltage = 12.0;
        let mut lvp = Port::new();
        lvp.pos_current_limit = 10.0;

        (hvb, hvp, lvb, lvp)
    }

    #[test]
    fn start_conditions_allow_buck_when_headroom_exists() {
        let (hvb, hvp, lvb, lvp) = hv_lv();
        let dcdc = Dcdc::new(20.0, 30.0, 20.0, 85.0);
        let mode = dcdc.check_start_conditions(100, (&hvb, &hvp), (&lvb, &lvp), false);
        assert_eq!(mode, DcdcMode::Buck);
    }

    #[test]
    fn start_conditions_off_on_battery_fault() {
        let (hvb, hvp, lvb, lvp) = hv_lv();
        let dcdc = Dcdc::new(20.0, 30.0, 20.0, 85.0);
        let mode = dcdc.check_start_conditions(100, (&hvb, &hvp), (&lvb, &lvp), true);
        assert_eq!(mode, DcdcMode::Off);
    }

    #[test]
    fn start_conditions_off_during_restart_interval() {
        let (hvb, hvp, lvb, lvp) = hv_lv();
        let mut dcdc = Dcdc::new(20.0, 30.0, 20.0, 85.0);
        dcdc.off_at = 50;
        let mode = dcdc.check_start_conditions(60, (&hvb, &hvp), (&lvb, &lvp), false);
        assert_eq!(mode, DcdcMode::Off);
    }

    #[test]
    fn control_starts_buck_after_inhibit_window() {
        let (hvb, mut hvp, lvb, mut lvp) = hv_lv();
        let mut dcdc = Dcdc::new(20.0, 30.0, 20.0, 85.0);
        dcdc.mode = DcdcMode::Buck;

        assert!(!dcdc.is_running());
        dcdc.control(0, &hvb, &mut hvp, &lvb, &mut lvp, false);
        assert!(!dcdc.is_running());

        dcdc.control(STARTUP_INHIBIT_S + 1, &hvb, &mut hvp, &lvb, &mut lvp, false);
        assert!(dcdc.is_running());
        assert!(dcdc.duty_cycle() > 0.0);
    }

    #[test]
    fn hs_mosfet_short_latches_after_ten_seconds() {
        let mut dcdc = Dcdc::new(20.0, 30.0, 20.0, 85.0);
        dcdc.inductor_current = 1.0;
        assert!(!dcdc.check_hs_mosfet_short(0, 15.0, 14.0));
        assert!(!dcdc.check_hs_mosfet_short(5, 15.0, 14.0));
        assert!(dcdc.check_hs_mosfet_short(11, 15.0, 14.0));
    }

    #[test]
    fn fuse_destruction_waits_for_grace_period() {
        let mut dcdc = Dcdc::new(20.0, 30.0, 20.0, 85.0);
        for _ in 0..FUSE_DESTRUCTION_GRACE_S {
            assert!(!dcdc.fuse_destruction());
        }
        assert!(dcdc.fuse_destruction());
    }
}
