//! Property-based tests for the last-write-wins merge rule.
//!
//! - Remote wins exactly when its timestamp is strictly newer
//! - Missing timestamps order before everything
//! - Replicas converge on the newest version whatever the delivery order

use cloudpos_store::{EntityStore, LocalStore, apply_remote, local_updated_at};
use cloudpos_sync::conflict::{MergeDecision, decide};
use cloudpos_sync::remote_wins;
use cloudpos_types::{CategoryFields, EntityId, EntityType, OutboxPayload, RemoteRow, Timestamp};
use proptest::prelude::*;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (0i64..4_000_000_000_000).prop_map(Timestamp::from_millis)
}

fn merge_one(store: &LocalStore, row: &RemoteRow) -> bool {
    store
        .transaction(|tx| {
            let local = local_updated_at(tx, row.entity_type(), row.id)?;
            if decide(row.updated_at, local) == MergeDecision::ApplyRemote {
                apply_remote(tx, row)?;
                Ok(true)
            } else {
                Ok(false)
            }
        })
        .unwrap()
}

// =============================================================================
// DECISION PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn remote_wins_iff_strictly_newer(remote in timestamp_strategy(), local in timestamp_strategy()) {
        prop_assert_eq!(remote_wins(Some(remote), Some(local)), remote > local);
    }

    #[test]
    fn equal_timestamps_keep_local(t in timestamp_strategy()) {
        prop_assert_eq!(decide(Some(t), Some(t)), MergeDecision::KeepLocal);
    }

    #[test]
    fn missing_local_always_loses(remote in timestamp_strategy()) {
        prop_assert_eq!(decide(Some(remote), None), MergeDecision::ApplyRemote);
    }

    #[test]
    fn missing_remote_never_wins(local in proptest::option::of(timestamp_strategy())) {
        prop_assert_eq!(decide(None, local), MergeDecision::KeepLocal);
    }
}

// =============================================================================
// CONVERGENCE
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Delivering the same versions in any order leaves the newest one.
    #[test]
    fn delivery_order_does_not_matter(
        stamps in prop::collection::btree_set(1i64..1_000_000, 1..8),
        seed in any::<u64>(),
    ) {
        let stamps: Vec<i64> = stamps.into_iter().collect();
        let id = EntityId::new();
        let versions: Vec<RemoteRow> = stamps
            .iter()
            .map(|&ms| RemoteRow {
                id,
                created_at: None,
                updated_at: Some(Timestamp::from_millis(ms)),
                is_deleted: false,
                payload: OutboxPayload::Category(CategoryFields::new(format!("v{ms}"))),
            })
            .collect();

        let mut shuffled = versions;
        let len = shuffled.len();
        for i in 0..len {
            let j = (seed.wrapping_mul(i as u64 + 1) % len as u64) as usize;
            shuffled.swap(i, j);
        }

        let store = LocalStore::open_in_memory().unwrap();
        for row in &shuffled {
            merge_one(&store, row);
        }
        // Merging everything again writes nothing.
        for row in &shuffled {
            prop_assert!(!merge_one(&store, row));
        }

        let newest = *stamps.last().unwrap();
        let local = EntityStore::new(store.clone())
            .get::<CategoryFields>(id)
            .unwrap()
            .unwrap();
        prop_assert_eq!(local.fields.name, format!("v{newest}"));
        prop_assert_eq!(local.meta.local_updated_at, Timestamp::from_millis(newest));

        let stored = store
            .transaction(|tx| local_updated_at(tx, EntityType::Category, id))
            .unwrap();
        prop_assert_eq!(stored, Some(Timestamp::from_millis(newest)));
    }
}
