//! End-to-end handshake packet accounting: each side's `Connection` must
//! bump its own `kadron-metrics` counters as the handshake packets cross,
//! independent of the peer's counters.

use kadron_metrics::PacketKind;
use kadron_transport::connection::{Connection, Mode};
use kadron_types::clock::ManualClock;

#[test]
fn handshake_bumps_sent_and_received_handshake_counters_on_both_sides() {
    let clock = ManualClock::new();
    let mut client = Connection::new(1, Mode::Datagram, 1500, 64);
    let req = client.start_connect(&clock);
    assert_eq!(client.counters().snapshot().sent(PacketKind::Handshake), 1);

    let (server, resp) = Connection::accept(2, Mode::Datagram, 1500, 64, &req).expect("accept");
    assert_eq!(server.counters().snapshot().received(PacketKind::Handshake), 1);
    assert_eq!(server.counters().snapshot().sent(PacketKind::Handshake), 1);

    client.on_handshake_response(&resp).expect("response");
    assert_eq!(client.counters().snapshot().received(PacketKind::Handshake), 1);

    // The two connections' counters are independent instances.
    assert_eq!(client.counters().snapshot().sent(PacketKind::Handshake), 1);
}
