/// Integration tests for peers joining a running session

use brawlsync_peer::{MutationOutcome, RequestState};
use brawlsync_shared::{
    Degenerate, Health, Loadout, Mutation, Payload, PeerId, Version, Weapon,
};
use brawlsync_test::{assert_converged, assert_outcome, init_logger, TestSession};

#[test]
fn newcomer_receives_every_entity_at_its_current_version() {
    init_logger();
    let mut session = TestSession::new(2);
    let boss = session.spawn(1, 1, Payload::Health(Health::new(300)));
    let loadout = session.spawn(2, 2, Payload::Loadout(Loadout::default()));

    let now = session.now();
    session
        .peer_mut(2)
        .mutate(&boss, Mutation::Damage(45), &now)
        .unwrap();
    session.run_until_idle();

    session.join(3);
    session.run_until_idle();

    let newcomer = session.peer(3);
    assert_eq!(newcomer.current_master(), PeerId(1));
    assert_eq!(newcomer.owner_of(&boss), Ok(PeerId(1)));
    assert_eq!(newcomer.owner_of(&loadout), Ok(PeerId(2)));
    assert_eq!(
        newcomer.entity(&boss).map(|replica| replica.version()),
        Some(Version(1))
    );
    assert_converged!(session, boss);
    assert_converged!(session, loadout);

    for id in [1, 2] {
        assert!(session
            .peer_mut(id)
            .take_events()
            .take_joins()
            .contains(&PeerId(3)));
    }
}

#[test]
fn newcomer_takes_part_in_mutations() {
    init_logger();
    let mut session = TestSession::new(2);
    let loadout = session.spawn(2, 2, Payload::Loadout(Loadout::default()));
    session.join(3);
    session.run_until_idle();

    let now = session.now();
    let equip = session
        .peer_mut(3)
        .mutate(
            &loadout,
            Mutation::EquipWeapon(Weapon::new("pipe", 2, Degenerate::OnHit)),
            &now,
        )
        .unwrap();
    assert_eq!(
        session.peer(3).request_state(&equip),
        Some(RequestState::Forwarded)
    );
    session.run_until_idle();

    let outcomes = session.peer_mut(3).take_events().take_outcomes();
    assert_outcome!(
        outcomes,
        equip,
        MutationOutcome::Confirmed { version: Version(1) }
    );
    assert_converged!(session, loadout);

    // Peer 3 is now known to everyone, so it can own things too
    let own = session.spawn(3, 3, Payload::Health(Health::new(80)));
    assert_converged!(session, own);
    assert_eq!(session.peer(1).owner_of(&own), Ok(PeerId(3)));
}

#[test]
fn rejoining_peer_starts_fresh() {
    init_logger();
    let mut session = TestSession::new(3);
    let boss = session.spawn(3, 3, Payload::Health(Health::new(100)));

    session.depart(3);
    session.run_until_idle();
    assert_eq!(session.peer(2).owner_of(&boss), Ok(PeerId(1)));

    session.join(3);
    session.run_until_idle();

    assert_eq!(session.peer(3).owner_of(&boss), Ok(PeerId(1)));
    assert_converged!(session, boss);

    // Serials restart with the new run of peer 3, ids must not
    let fresh = session.spawn(3, 3, Payload::Health(Health::new(7)));
    assert_eq!(fresh.serial, boss.serial);
    assert_ne!(fresh, boss);
    assert_converged!(session, fresh);
    assert_converged!(session, boss);
    for id in [1, 2, 3] {
        let peer = session.peer(id);
        assert_eq!(peer.owner_of(&fresh), Ok(PeerId(3)));
        assert_eq!(peer.owner_of(&boss), Ok(PeerId(1)));
        assert_eq!(
            peer.entity(&boss)
                .and_then(|replica| replica.payload().as_health())
                .map(|health| health.current_hp),
            Some(100)
        );
    }
    assert_eq!(session.peer(3).unacked_len(&PeerId(1)), 0);
}
