/// Integration tests for peer departure and master handoff
/// The departed peer's entities always have an owner, the lowest survivor
/// takes over as master, and requests made during the handoff are held
/// until the new master has announced itself

use brawlsync_peer::{MutationOutcome, RequestState};
use brawlsync_shared::{
    EntityId, EntityLifecycleEvent, Health, Mutation, Payload, PeerId, ReplicationError, Version,
    Wave, WaveProgress,
};
use brawlsync_test::{assert_converged, assert_outcome, init_logger, TestSession};

fn health(max_hp: u32) -> Payload {
    Payload::Health(Health::new(max_hp))
}

fn waves() -> Payload {
    Payload::WaveProgress(WaveProgress::new(vec![Wave::default(), Wave::default()]))
}

fn hp(session: &TestSession, peer: u16, entity: EntityId) -> u32 {
    session
        .peer(peer)
        .entity(&entity)
        .and_then(|replica| replica.payload().as_health())
        .map(|health| health.current_hp)
        .expect("entity must hold health")
}

#[test]
fn lowest_survivor_inherits_master_and_entities() {
    init_logger();
    let mut session = TestSession::new(3);
    let level = session.spawn(1, 1, waves());
    let player = session.spawn(2, 2, health(100));
    for id in session.peer_ids() {
        session.peer_mut(id.0).take_events();
    }

    session.depart(1);

    // Ownership moved at once, before any message was exchanged
    for id in [2, 3] {
        assert_eq!(session.peer(id).current_master(), PeerId(2));
        assert_eq!(session.peer(id).owner_of(&level), Ok(PeerId(2)));
        assert_eq!(session.peer(id).owner_of(&player), Ok(PeerId(2)));
        let mut events = session.peer_mut(id).take_events();
        assert_eq!(events.take_departures(), vec![PeerId(1)]);
        assert_eq!(events.take_master_changes(), vec![PeerId(2)]);
    }
    assert!(session.peer(2).is_master());

    session.run_until_idle();
    assert_converged!(session, level);
    assert_converged!(session, player);
}

#[test]
fn request_during_handoff_is_held_then_confirmed() {
    init_logger();
    let mut session = TestSession::new(3);
    let level = session.spawn(1, 1, waves());
    for id in session.peer_ids() {
        session.peer_mut(id.0).take_events();
    }

    session.depart(1);

    // Peer 3 has not heard from the new master yet
    let now = session.now();
    let request = session
        .peer_mut(3)
        .mutate(&level, Mutation::AdvanceWave, &now)
        .unwrap();
    assert_eq!(
        session.peer(3).request_state(&request),
        Some(RequestState::Requested)
    );

    session.run_until_idle();

    let mut events = session.peer_mut(3).take_events();
    assert_outcome!(
        events.take_outcomes(),
        request,
        MutationOutcome::Confirmed { version: Version(1) }
    );
    assert_eq!(
        events.take_lifecycle(),
        vec![
            (level, EntityLifecycleEvent::WaveCompleted(0)),
            (level, EntityLifecycleEvent::WaveStarted(1))
        ]
    );
    assert_converged!(session, level);
}

#[test]
fn request_forwarded_to_departed_owner_is_cancelled() {
    init_logger();
    let mut session = TestSession::new(3);
    let player = session.spawn(1, 1, health(100));

    let now = session.now();
    let request = session
        .peer_mut(3)
        .mutate(&player, Mutation::Damage(10), &now)
        .unwrap();
    session.depart(1);

    assert_eq!(
        session.peer(3).request_state(&request),
        Some(RequestState::Cancelled)
    );
    let outcomes = session.peer_mut(3).take_events().take_outcomes();
    assert_outcome!(
        outcomes,
        request,
        MutationOutcome::Cancelled {
            error: ReplicationError::Cancelled { .. }
        }
    );

    session.run_until_idle();
    assert_converged!(session, player);
    assert_eq!(hp(&session, 2, player), 100);
}

#[test]
fn master_announcement_can_precede_departure_notice() {
    init_logger();
    let mut session = TestSession::new(3);
    let player = session.spawn(1, 1, health(50));
    for id in session.peer_ids() {
        session.peer_mut(id.0).take_events();
    }

    // Only peer 2 learns about the departure from presence
    session.drop_peer(1);
    session.notify_departure(2, 1);
    session.run_until_idle();

    assert_eq!(session.peer(3).current_master(), PeerId(2));
    assert_eq!(session.peer(3).owner_of(&player), Ok(PeerId(2)));
    assert_eq!(
        session.peer_mut(3).take_events().take_departures(),
        vec![PeerId(1)]
    );

    // The late notice changes nothing
    session.notify_departure(3, 1);
    let mut events = session.peer_mut(3).take_events();
    assert!(events.take_departures().is_empty());
    assert!(events.take_master_changes().is_empty());
    assert_converged!(session, player);
}

#[test]
fn non_master_departure_moves_entities_to_master() {
    init_logger();
    let mut session = TestSession::new(3);
    let player = session.spawn(2, 2, health(100));

    session.depart(2);
    assert_eq!(session.peer(1).current_master(), PeerId(1));
    assert_eq!(session.peer(3).current_master(), PeerId(1));
    assert_eq!(session.peer(3).owner_of(&player), Ok(PeerId(1)));

    session.run_until_idle();
    assert_converged!(session, player);

    let now = session.now();
    let request = session
        .peer_mut(3)
        .mutate(&player, Mutation::Damage(30), &now)
        .unwrap();
    session.run_until_idle();

    let outcomes = session.peer_mut(3).take_events().take_outcomes();
    assert_outcome!(
        outcomes,
        request,
        MutationOutcome::Confirmed { version: Version(1) }
    );
    assert_converged!(session, player);
    assert_eq!(hp(&session, 1, player), 70);
}

#[test]
fn master_completes_transfer_interrupted_by_departure() {
    init_logger();
    let mut session = TestSession::new(3);
    let player = session.spawn(2, 2, health(100));

    // The owner leaves before it could answer the master's request
    session
        .peer_mut(1)
        .transfer_ownership(&player, PeerId(3))
        .unwrap();
    session.depart(2);
    session.run_until_idle();

    for id in [1, 3] {
        assert_eq!(session.peer(id).owner_of(&player), Ok(PeerId(3)));
    }
    assert_converged!(session, player);
}

#[test]
fn entities_survive_consecutive_departures() {
    init_logger();
    let mut session = TestSession::new(3);
    let level = session.spawn(1, 1, waves());
    let player = session.spawn(2, 2, health(100));

    session.depart(1);
    session.run_until_idle();
    session.depart(2);
    session.run_until_idle();

    let survivor = session.peer(3);
    assert!(survivor.is_master());
    assert_eq!(survivor.owner_of(&level), Ok(PeerId(3)));
    assert_eq!(survivor.owner_of(&player), Ok(PeerId(3)));

    let now = session.now();
    let request = session
        .peer_mut(3)
        .mutate(&player, Mutation::Damage(1), &now)
        .unwrap();
    assert_eq!(
        session.peer(3).request_state(&request),
        Some(RequestState::Confirmed)
    );
    assert_eq!(hp(&session, 3, player), 99);
}
