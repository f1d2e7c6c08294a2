//! Power stage control (Component D): the buck/boost DC/DC converter and the
//! simpler PWM shunt switch, whichever the board variant populates.
//!
//! Both forms share the same perturb-and-observe MPPT idea and the same
//! start/stop hysteresis shape; they are kept as separate types rather than
//! one generic because their control loops branch on different state
//! (inductor current vs. plain on/off) and folding them together would
//! obscure both.

pub mod dcdc;
pub mod pwm_switch;

pub use dcdc::{Dcdc, DcdcMode, DcdcState};
pub use pwm_switch::PwmSwitch;
