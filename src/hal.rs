//! Consumed external interfaces (§6.1-6.5): the traits a board crate
//! implements so this crate's control logic can run against real hardware.
//! Test modules throughout the crate implement these with trivial
//! in-memory fakes instead of mocked hardware, mirroring the original
//! firmware's `adc_dma_stub.cpp`.

use crate::persist::RestoreError;

/// One ADC-backed measurement channel: instantaneous and filtered voltage
/// or current.
#[derive(Debug, Clone, Copy, Default)]
pub struct Measurement {
    pub value: f32,
    pub value_filtered: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Upper,
    Lower,
}

/// Measurement front end (§6.1): ADC channels plus the upper/lower alert
/// mechanism an ISR uses to react faster than the slow tick could.
pub trait MeasurementFrontEnd {
    type Channel: Copy;

    fn get(&self, channel: Self::Channel) -> Measurement;

    /// Called once at startup with outputs forced off, to null out any
    /// current-sense amplifier offset.
    fn calibrate_zero_current(&mut self);

    fn set_alert(&mut self, channel: Self::Channel, kind: AlertKind, threshold: f32);

    /// Silences a channel's alerts for `duration_ms`, e.g. around a PWM
    /// switch-on edge's expected voltage transient.
    fn inhibit(&mut self, channel: Self::Channel, kind: AlertKind, duration_ms: u32);
}

/// Half-bridge driver for the buck/boost converter (§6.2).
pub trait HalfBridge {
    fn init(&mut self, freq_khz: u32, deadtime_ns: u32, duty_min: f32, duty_max: f32);
    fn start(&mut self);
    fn stop(&mut self);
    fn set_duty(&mut self, duty: f32);
    fn set_ccr(&mut self, ccr: i32);
    fn get_ccr(&self) -> i32;
    fn get_duty(&self) -> f32;
    fn enabled(&self) -> bool;
}

/// PWM shunt switch driver (§6.2), for board variants without a full
/// half-bridge converter.
pub trait PwmSwitchDriver {
    fn start(&mut self, duty: f32);
    fn stop(&mut self);
    fn step(&mut self, delta: i8);
    fn set_duty(&mut self, duty: f32);
    fn active(&self) -> bool;
    fn signal_high(&self) -> bool;
}

/// Named GPIO outputs (§6.3): load switch, USB switch, HV output enable,
/// CAN transceiver enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioPin {
    LoadSwitch,
    UsbSwitch,
    HvOutputEnable,
    CanEnable,
}

pub trait GpioDriver {
    fn set(&mut self, pin: GpioPin, level: bool);
}

/// Persistent store (§6.4): a device that can read/write a raw byte range.
/// [`crate::persist::encode`]/[`crate::persist::decode`] handle the framing
/// on top of this; implementors only need to move bytes.
pub trait PersistentStore {
    type Error;

    fn write_at(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;
    fn read_at(&mut self, addr: u32, out: &mut [u8]) -> Result<(), Self::Error>;
}

/// Loads and validates a config/telemetry blob from a [`PersistentStore`]
/// at address 0, using the persist module's header framing.
pub fn restore<S: PersistentStore>(store: &mut S, buf: &mut [u8], expected_version: u16) -> Result<usize, RestoreError>
where
    S::Error: core::fmt::Debug,
{
    store.read_at(0, &mut buf[..crate::persist::HEADER_LEN]).map_err(|_| RestoreError::Truncated)?;
    let len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    let total = crate::persist::HEADER_LEN + len;
    if buf.len() < total {
        return Err(RestoreError::Truncated);
    }
    store
        .read_at(crate::persist::HEADER_LEN as u32, &mut buf[crate::persist::HEADER_LEN..total])
        .map_err(|_| RestoreError::Truncated)?;
    crate::persist::decode(&buf[..total], expected_version)?;
    Ok(total)
}

/// Peer control channel (§6.5): the transport is out of scope, but every
/// implementation must route received target-current messages through
/// this hook so the charger can fall into Follower mode.
pub trait PeerChannel {
    fn poll_target_current(&mut self) -> Option<f32>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct FakeStore {
        bytes: BTreeMap<u32, u8>,
    }

    impl PersistentStore for FakeStore {
        type Error = ();

        fn write_at(&mut self, addr: u32, data: &[u8]) -> Result<(), ()> {
            for (i, b) in data.iter().enumerate() {
                self.bytes.insert(addr + i as u32, *b);
            }
            Ok(())
        }

        fn read_at(&mut self, addr: u32, out: &mut [u8]) -> Result<(), ()> {
            for (i, b) in out.iter_mut().enumerate() {
                *b = *self.bytes.get(&(addr + i as u32)).unwrap_or(&0);
            }
            Ok(())
        }
    }

    #[test]
    fn restore_round_trips_through_a_fake_store() {
        let mut store = FakeStore { bytes: BTreeMap::new() };
        let payload = [9u8, 8, 7, 6];
        let mut write_buf = [0u8; 32];
        let len = crate::persist::encode(&mut write_buf, 1, &payload).unwrap();
        store.write_at(0, &write_buf[..len]).unwrap();

        let mut read_buf = [0u8; 32];
        let n = restore(&mut store, &mut read_buf, 1).unwrap();
        assert_eq!(&read_buf[crate::persist::HEADER_LEN..n], &payload);
    }

    #[test]
    fn restore_rejects_version_mismatch() {
        let mut store = FakeStore { bytes: BTreeMap::new() };
        let payload = [1u8];
        let mut write_buf = [0u8; 32];
        let len = crate::persist::encode(&mut write_buf, 1, &payload).unwrap();
        store.write_at(0, &write_buf[..len]).unwrap();

        let mut read_buf = [0u8; 32];
        assert!(matches!(restore(&mut store, &mut read_buf, 2), Err(RestoreError::VersionMismatch { .. })));
    }
}
