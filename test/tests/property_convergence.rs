/// PROPERTY-BASED TESTS: Replication invariants
///
/// Uses proptest to drive sessions with random mutation streams over links
/// that drop, duplicate and reorder packets.
///
/// Key invariants:
/// 1. Every peer ends with the same version and payload
/// 2. Observers apply versions one at a time, in order
/// 3. Every accepted request is applied exactly once

use std::time::Duration;

use proptest::prelude::*;

use brawlsync_peer::{AuthorityConfig, PeerConfig};
use brawlsync_shared::{Health, Mutation, Payload, Version};
use brawlsync_test::{assert_converged, TestSession, TICK};

fn patient_config() -> PeerConfig {
    PeerConfig {
        authority: AuthorityConfig {
            confirm_timeout: Duration::from_secs(120),
            max_attempts: 2,
        },
        ..PeerConfig::default()
    }
}

// (requesting peer, mutation)
fn op_strategy() -> impl Strategy<Value = (u16, Mutation)> {
    (
        1u16..=3u16,
        prop_oneof![
            (0u32..40).prop_map(Mutation::Damage),
            (0u32..40).prop_map(Mutation::Heal),
        ],
    )
}

fn run_ops(session: &mut TestSession, entity: brawlsync_shared::EntityId, ops: &[(u16, Mutation)]) {
    for (peer, mutation) in ops {
        let now = session.now();
        session
            .peer_mut(*peer)
            .mutate(&entity, mutation.clone(), &now)
            .unwrap();
        session.tick();
        session.advance(TICK);
    }
    session.run_for(Duration::from_secs(3));
    session.hub().heal();
    session.run_until_idle();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Test that all peers agree after any mutation stream over faulty links
    #[test]
    fn prop_peers_converge(
        ops in prop::collection::vec(op_strategy(), 1..12),
        seed in any::<u64>(),
        drop_rate in 0.0f64..0.3,
    ) {
        let mut session = TestSession::with_config(3, patient_config(), seed);
        let entity = session.spawn(1, 1, Payload::Health(Health::with_current(100, 200)));
        session.hub().set_drop_rate(drop_rate);
        session.hub().set_duplicate_rate(0.2);
        session.hub().set_reorder(true);

        run_ops(&mut session, entity, &ops);

        assert_converged!(session, entity);
        let version = session.peer(2).entity(&entity).map(|replica| replica.version());
        prop_assert_eq!(version, Some(Version(ops.len() as u32)));
    }

    /// Test that observers see every version exactly once and in order
    #[test]
    fn prop_versions_step_by_one(
        ops in prop::collection::vec(op_strategy(), 1..12),
        seed in any::<u64>(),
    ) {
        let mut session = TestSession::with_config(3, patient_config(), seed);
        let entity = session.spawn(1, 1, Payload::Health(Health::new(500)));
        session.peer_mut(3).take_events();
        session.hub().set_duplicate_rate(0.5);
        session.hub().set_reorder(true);

        run_ops(&mut session, entity, &ops);

        let versions: Vec<u32> = session
            .peer_mut(3)
            .take_events()
            .take_updates()
            .into_iter()
            .filter(|(updated, _)| *updated == entity)
            .map(|(_, version)| version.0)
            .collect();
        let expected: Vec<u32> = (1..=ops.len() as u32).collect();
        prop_assert_eq!(versions, expected);
    }

    /// Test that damage totals match the requests, however they interleave
    #[test]
    fn prop_damage_applied_exactly_once(
        damages in prop::collection::vec((2u16..=3u16, 1u32..30), 1..12),
        seed in any::<u64>(),
    ) {
        let mut session = TestSession::with_config(3, patient_config(), seed);
        let entity = session.spawn(1, 1, Payload::Health(Health::new(1000)));
        session.hub().set_drop_rate(0.2);
        session.hub().set_duplicate_rate(0.3);
        session.hub().set_reorder(true);

        let ops: Vec<(u16, Mutation)> = damages
            .iter()
            .map(|(peer, amount)| (*peer, Mutation::Damage(*amount)))
            .collect();
        run_ops(&mut session, entity, &ops);

        let total: u32 = damages.iter().map(|(_, amount)| amount).sum();
        let current_hp = session
            .peer(1)
            .entity(&entity)
            .and_then(|replica| replica.payload().as_health())
            .map(|health| health.current_hp);
        prop_assert_eq!(current_hp, Some(1000 - total));
        assert_converged!(session, entity);
    }
}
