//! Error taxonomy shared by every component.
//!
//! Every fallible operation returns [`Result<T, FaultKind>`](Result) rather
//! than panicking. A `FaultKind` returned from a call is also expected to be
//! recorded into the context-wide [`crate::status::ErrorFlags`] bitset by the
//! caller — the return value drives this tick's reaction, the bitset is the
//! cross-tick, cross-component source of truth.

/// Plain alias used throughout the crate instead of a bespoke `Result`.
pub type Result<T> = core::result::Result<T, FaultKind>;

/// One variant per bit of the error-flags word (§7 of the battery/charger
/// design this crate implements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    BatChargeOvertemp,
    BatChargeUndertemp,
    BatDischargeOvertemp,
    BatDischargeUndertemp,
    BatOvervoltage,
    BatUndervoltage,
    DcdcHsMosfetShort,
    InternalOvertemp,
    LoadOvervoltage,
    LoadOvercurrent,
    LoadShortCircuit,
    LoadVoltageDip,
    /// Informational only, never latched as a hard fault: the load manager
    /// shed a load output due to low voltage. Consumed by the charger's SOH
    /// accounting.
    LoadShedding,
    /// A config commit failed its validation pass; the staging copy was not
    /// applied.
    ConfigInvalid,
    /// The persistent store's header or CRC did not validate on load.
    StoreCorrupt,
}

impl FaultKind {
    /// Bit position within the error-flags word, stable for telemetry.
    pub const fn bit(self) -> u32 {
        match self {
            FaultKind::BatChargeOvertemp => 0,
            FaultKind::BatChargeUndertemp => 1,
            FaultKind::BatDischargeOvertemp => 2,
            FaultKind::BatDischargeUndertemp => 3,
            FaultKind::BatOvervoltage => 4,
            FaultKind::BatUndervoltage => 5,
            FaultKind::DcdcHsMosfetShort => 6,
            FaultKind::InternalOvertemp => 7,
            FaultKind::LoadOvervoltage => 8,
            FaultKind::LoadOvercurrent => 9,
            FaultKind::LoadShortCircuit => 10,
            FaultKind::LoadVoltageDip => 11,
            FaultKind::LoadShedding => 12,
            FaultKind::ConfigInvalid => 13,
            FaultKind::StoreCorrupt => 14,
        }
    }

    pub const fn mask(self) -> u32 {
        1 << self.bit()
    }
}
