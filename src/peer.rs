//! Peer control channel glue (§6.5).
//!
//! The transport is out of scope for this crate (CAN/serial/LoRa framing,
//! per spec.md §1's non-goals); this module only defines the poll-and-feed
//! shape a context ties together once per slow tick: poll whatever
//! [`crate::hal::PeerChannel`] the board provides, and if a message
//! arrived, route it through [`crate::charger::Charger::on_peer_message`].

use crate::charger::Charger;
use crate::hal::PeerChannel;

/// Polls `channel` once and feeds any received target-current value into
/// `charger`'s peer-message hook. Call once per slow tick.
pub fn poll(now: u64, channel: &mut impl PeerChannel, charger: &mut Charger) {
    if let Some(target_current) = channel.poll_target_current() {
        charger.on_peer_message(now, target_current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::BatteryConfig;
    use crate::bus::{DcBus, Port};
    use crate::status::ErrorFlags;

    struct FakeChannel(Option<f32>);

    impl PeerChannel for FakeChannel {
        fn poll_target_current(&mut self) -> Option<f32> {
            self.0.take()
        }
    }

    #[test]
    fn forwards_received_message_to_charger() {
        let mut charger = Charger::new();
        let mut channel = FakeChannel(Some(5.0));
        poll(10, &mut channel, &mut charger);

        let bat = BatteryConfig::init(crate::battery::BatteryChemistry::Lfp, 4, 100.0);
        let mut bus = DcBus::new();
        let mut port = Port::new();
        let mut errors = ErrorFlags::empty();
        charger.tick(10, &mut bus, &mut port, &bat, &mut errors, false);
        assert_eq!(charger.state, crate::charger::ChargerState::Follower);
    }

    #[test]
    fn no_message_leaves_charger_untouched() {
        let mut charger = Charger::new();
        let mut channel = FakeChannel(None);
        poll(10, &mut channel, &mut charger);
        assert_eq!(charger.state, crate::charger::ChargerState::Idle);
    }
}
