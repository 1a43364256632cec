/// Integration tests for the command channel over a lossy hub
/// Loss, duplication and reordering must never change what the peers agree on

use std::time::{Duration, Instant};

use brawlsync_peer::{
    AuthorityConfig, ChannelConfig, CommandChannel, MutationOutcome, PeerConfig, Targets,
};
use brawlsync_shared::{
    EntityId, Health, Mutation, NetMessage, Payload, PeerId, Version, DEFAULT_MAX_PACKET_SIZE,
};
use brawlsync_test::{assert_converged, init_logger, LocalHub, TestSession, TICK};

fn patient_config() -> PeerConfig {
    PeerConfig {
        authority: AuthorityConfig {
            confirm_timeout: Duration::from_secs(60),
            max_attempts: 2,
        },
        ..PeerConfig::default()
    }
}

#[test]
fn every_mutation_applies_exactly_once_over_faulty_links() {
    init_logger();
    let mut session = TestSession::with_config(3, patient_config(), 11);
    let entity = session.spawn(1, 1, Payload::Health(Health::new(1000)));

    let hub = session.hub().clone();
    hub.set_drop_rate(0.3);
    hub.set_duplicate_rate(0.3);
    hub.set_reorder(true);

    let mut requests = Vec::new();
    for _ in 0..10 {
        let now = session.now();
        for id in [2, 3] {
            let request = session
                .peer_mut(id)
                .mutate(&entity, Mutation::Damage(3), &now)
                .unwrap();
            requests.push((id, request));
        }
        session.tick();
        session.advance(TICK);
    }
    session.run_for(Duration::from_secs(5));
    hub.heal();
    session.run_until_idle();

    assert_converged!(session, entity);
    let replica = session.peer(1).entity(&entity).unwrap();
    assert_eq!(replica.version(), Version(20));
    assert_eq!(replica.payload().as_health().unwrap().current_hp, 940);

    for id in [2, 3] {
        let outcomes = session.peer_mut(id).take_events().take_outcomes();
        let confirmed = outcomes
            .iter()
            .filter(|(_, _, outcome)| outcome.is_confirmed())
            .count();
        assert_eq!(confirmed, 10, "peer {} missed confirmations", id);
        assert!(outcomes
            .iter()
            .all(|(request, _, _)| requests.contains(&(id, *request))));
    }
    assert!(hub.sent_count() > 0);
}

#[test]
fn confirmed_versions_are_distinct_under_duplication() {
    init_logger();
    let mut session = TestSession::with_config(2, patient_config(), 23);
    let entity = session.spawn(1, 1, Payload::Health(Health::new(100)));
    session.hub().set_duplicate_rate(1.0);

    let now = session.now();
    for _ in 0..5 {
        session
            .peer_mut(2)
            .mutate(&entity, Mutation::Heal(1), &now)
            .unwrap();
    }
    session.run_until_idle();
    session.hub().heal();
    session.run_until_idle();

    let mut versions: Vec<Version> = session
        .peer_mut(2)
        .take_events()
        .take_outcomes()
        .into_iter()
        .filter_map(|(_, _, outcome)| match outcome {
            MutationOutcome::Confirmed { version } => Some(version),
            _ => None,
        })
        .collect();
    versions.sort();
    assert_eq!(
        versions,
        vec![Version(1), Version(2), Version(3), Version(4), Version(5)]
    );
    assert_converged!(session, entity);
}

#[test]
fn channel_delivers_in_send_order_despite_reordering() {
    init_logger();
    let hub = LocalHub::new(41);
    hub.set_reorder(true);
    hub.set_drop_rate(0.2);
    let config = ChannelConfig {
        resend_interval: Duration::from_millis(10),
        resend_jitter: Duration::ZERO,
        max_packet_size: DEFAULT_MAX_PACKET_SIZE,
    };
    let mut alice = CommandChannel::new(
        PeerId(1),
        [PeerId(2)],
        hub.transport(PeerId(1)),
        config.clone(),
    );
    let mut bob = CommandChannel::new(PeerId(2), [PeerId(1)], hub.transport(PeerId(2)), config);

    let entities: Vec<EntityId> = (1..=30).map(|serial| EntityId::new(PeerId(1), serial)).collect();
    for entity in &entities {
        alice
            .send(Targets::Single(PeerId(2)), NetMessage::ResyncRequest { entity: *entity })
            .unwrap();
    }

    let mut now = Instant::now();
    let mut delivered = Vec::new();
    for _ in 0..500 {
        alice.flush(&now).unwrap();
        for (from, message) in bob.receive().unwrap() {
            assert_eq!(from, PeerId(1));
            if let NetMessage::ResyncRequest { entity } = message {
                delivered.push(entity);
            }
        }
        bob.flush(&now).unwrap();
        alice.receive().unwrap();
        if alice.unacked_len(&PeerId(2)) == 0 {
            break;
        }
        now += Duration::from_millis(10);
    }

    assert_eq!(delivered, entities);
    assert_eq!(alice.unacked_len(&PeerId(2)), 0);
}

#[test]
fn oversized_message_is_refused_before_queueing() {
    init_logger();
    let hub = LocalHub::new(1);
    let config = ChannelConfig {
        max_packet_size: 64,
        ..ChannelConfig::default()
    };
    let mut channel = CommandChannel::new(PeerId(1), [PeerId(2)], hub.transport(PeerId(1)), config);

    let snapshot = brawlsync_shared::EntitySnapshot {
        entity: EntityId::new(PeerId(1), 1),
        owner: PeerId(1),
        version: Version(0),
        payload: Payload::Health(Health::new(100)),
        ledger: brawlsync_shared::RequestLedger::new(),
    };
    let result = channel.send(Targets::AllExceptSender, NetMessage::SpawnEntity(snapshot));

    assert!(matches!(
        result,
        Err(brawlsync_peer::ChannelError::Codec(
            brawlsync_shared::CodecError::TooLarge { max: 64, .. }
        ))
    ));
    assert_eq!(channel.unacked_len(&PeerId(2)), 0);
}

#[test]
fn loopback_reaches_sender_first() {
    init_logger();
    let hub = LocalHub::new(1);
    let mut channel = CommandChannel::new(
        PeerId(1),
        [PeerId(2)],
        hub.transport(PeerId(1)),
        ChannelConfig::default(),
    );
    let entity = EntityId::new(PeerId(1), 1);

    channel
        .send(Targets::All, NetMessage::DespawnEntity { entity })
        .unwrap();

    let received = channel.receive().unwrap();
    assert_eq!(
        received,
        vec![(PeerId(1), NetMessage::DespawnEntity { entity })]
    );
    assert_eq!(channel.unacked_len(&PeerId(2)), 1);
}
