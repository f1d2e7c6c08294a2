//! Control core for a multi-phase solar charge controller: battery
//! configuration and validation, the Idle/Bulk/Topping/Float/Equalization/
//! Follower charge state machine, buck/boost DC/DC and PWM-switch power
//! stage control, load output protection, device-status/energy accounting,
//! a measurement adapter, a persistent-store codec and a telemetry node
//! table.
//!
//! `#![no_std]` by default (flip the `nostd` feature on); the `std` feature
//! is the host/test configuration, the same split `signal-processing`
//! uses.

#![cfg_attr(feature = "nostd", no_std)]

#[macro_use]
extern crate logger;

pub mod battery;
pub mod bus;
pub mod charger;
pub mod context;
pub mod error;
pub mod hal;
pub mod load;
pub mod measurement;
pub mod peer;
pub mod persist;
pub mod power_stage;
pub mod status;
pub mod telemetry;

pub use battery::{BatteryChemistry, BatteryConfig};
pub use charger::{Charger, ChargerState};
pub use context::ControllerContext;
pub use error::{FaultKind, Result};
