// A host and two guests through the real stacks: registration barrier,
// setup fan-out, and a round of moves with every device's trays, scores,
// and pool staying in lockstep.

use lexloom_server::{GameState, PlayerConfig};
use multiplayer_tests::{
    TestDevice, device_addr, guest_config, host_config, pump, standard_dict,
};

fn three_device_game() -> (TestDevice, TestDevice, TestDevice) {
    let host_addr = device_addr(1);
    let mut host = TestDevice::new(
        host_config(vec![PlayerConfig::human("hana")], 2),
        Some(standard_dict()),
        host_addr.clone(),
        host_addr.clone(),
    );
    let mut guest_a = TestDevice::new(
        guest_config("gwen"),
        None,
        device_addr(2),
        host_addr.clone(),
    );
    let mut guest_b = TestDevice::new(guest_config("bert"), None, device_addr(3), host_addr);

    guest_a.server.init_client_connection(&mut guest_a.util);
    guest_b.server.init_client_connection(&mut guest_b.util);
    pump(&mut [&mut host, &mut guest_a, &mut guest_b]);
    (host, guest_a, guest_b)
}

#[test]
fn registration_barrier_releases_into_play() {
    let host_addr = device_addr(1);
    let mut host = TestDevice::new(
        host_config(vec![PlayerConfig::human("hana")], 2),
        Some(standard_dict()),
        host_addr.clone(),
        host_addr.clone(),
    );
    let mut guest_a = TestDevice::new(
        guest_config("gwen"),
        None,
        device_addr(2),
        host_addr.clone(),
    );
    let mut guest_b = TestDevice::new(guest_config("bert"), None, device_addr(3), host_addr);

    // One registration is not enough; nobody moves.
    guest_a.server.init_client_connection(&mut guest_a.util);
    pump(&mut [&mut host, &mut guest_a, &mut guest_b]);
    assert_eq!(host.server.state(), GameState::WaitingAllReg);
    assert_eq!(guest_a.server.state(), GameState::New);

    // The last seat filling releases setup to everyone.
    guest_b.server.init_client_connection(&mut guest_b.util);
    pump(&mut [&mut host, &mut guest_a, &mut guest_b]);
    for device in [&host, &guest_a, &guest_b] {
        assert_eq!(device.server.state(), GameState::InTurn);
        assert_eq!(device.server.current_turn(), Some(0));
        assert_eq!(device.server.tiles_in_pool(), Some(2));
    }

    // Seats filled in registration order, names carried over.
    let players = &host.server.config().players;
    assert_eq!(players[0].name, "hana");
    assert_eq!(players[1].name, "gwen");
    assert_eq!(players[2].name, "bert");

    // Each guest sees only its own seat as local.
    assert!(!guest_a.server.config().players[0].is_local);
    assert!(guest_a.server.config().players[1].is_local);
    assert!(!guest_a.server.config().players[2].is_local);
    assert!(guest_b.server.config().players[2].is_local);

    // The dealt trays travelled intact.
    for seat in 0..3 {
        let tray = host.server.model().tray(seat);
        assert_eq!(tray.len(), 7);
        assert_eq!(guest_a.server.model().tray(seat), tray);
        assert_eq!(guest_b.server.model().tray(seat), tray);
    }
}

#[test]
fn moves_and_trades_stay_in_lockstep() {
    let (mut host, mut guest_a, mut guest_b) = three_device_game();

    // Seat 0, on the host, plays two tiles.
    assert!(host.play_tiles(2));
    pump(&mut [&mut host, &mut guest_a, &mut guest_b]);
    for device in [&host, &guest_a, &guest_b] {
        assert_eq!(device.server.current_turn(), Some(1));
        assert_eq!(device.server.model().score(0), 2);
        assert_eq!(device.server.tiles_in_pool(), Some(0));
    }

    // Seat 1, on guest A, plays one (no replacement left to draw).
    assert!(guest_a.play_tiles(1));
    pump(&mut [&mut host, &mut guest_a, &mut guest_b]);
    for device in [&host, &guest_a, &guest_b] {
        assert_eq!(device.server.current_turn(), Some(2));
        assert_eq!(device.server.model().score(1), 1);
    }

    // Seat 2, on guest B, trades two tiles back into the pool.
    assert!(guest_b.trade_tiles(2));
    pump(&mut [&mut host, &mut guest_a, &mut guest_b]);
    for device in [&host, &guest_a, &guest_b] {
        assert_eq!(device.server.current_turn(), Some(0));
        assert_eq!(device.server.tiles_in_pool(), Some(2));
    }

    // A pass also rotates everywhere.
    assert!(host.pass());
    pump(&mut [&mut host, &mut guest_a, &mut guest_b]);
    for device in [&host, &guest_a, &guest_b] {
        assert_eq!(device.server.current_turn(), Some(1));
    }

    // After all of it, every device agrees on every tray.
    for seat in 0..3 {
        let tray = host.server.model().tray(seat);
        assert_eq!(guest_a.server.model().tray(seat), tray);
        assert_eq!(guest_b.server.model().tray(seat), tray);
    }
}
