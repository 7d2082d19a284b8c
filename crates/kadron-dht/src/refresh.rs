//! Bucket-refresh scheduling: `RefreshBuckets(target)` picks the set of
//! bucket targets whose contents have gone stale (section 4.2, final
//! paragraph).

use std::time::Duration;

use kadron_routing::{RoutingTable, NUM_BUCKETS};
use kadron_types::{Clock, NodeId};
use rand::RngCore;

/// Return lookup targets for every bucket whose most recent activity is
/// older than `stale_after`. For every bucket except the closest one (the
/// last index, reserved for the local node's own ID), the target is a
/// random ID within that bucket; the closest bucket refreshes with the
/// local node's own ID.
///
/// `last_active` must return the age of the bucket's most recent insert or
/// lookup hit; buckets with no recorded activity are always considered
/// stale.
pub fn refresh_targets(
    table: &RoutingTable,
    clock: &impl Clock,
    stale_after: Duration,
    last_active: impl Fn(usize) -> Option<std::time::Instant>,
    rng: &mut impl RngCore,
) -> Vec<NodeId> {
    let now = clock.now();
    let mut targets = Vec::new();

    for bucket in 0..NUM_BUCKETS {
        let is_stale = match last_active(bucket) {
            Some(seen) => now.duration_since(seen) >= stale_after,
            None => true,
        };
        if !is_stale {
            continue;
        }

        let target = if bucket == NUM_BUCKETS - 1 {
            table.local_id()
        } else {
            table.random_id_in_bucket(bucket, rng)
        };
        targets.push(target);
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadron_types::clock::ManualClock;

    #[test]
    fn all_buckets_without_activity_are_stale() {
        let table = RoutingTable::new(NodeId::from([0x11; 32]));
        let clock = ManualClock::new();
        let mut rng = rand::thread_rng();
        let targets = refresh_targets(
            &table,
            &clock,
            Duration::from_secs(3600),
            |_| None,
            &mut rng,
        );
        assert_eq!(targets.len(), NUM_BUCKETS);
    }

    #[test]
    fn recently_active_bucket_is_skipped() {
        let table = RoutingTable::new(NodeId::from([0x11; 32]));
        let clock = ManualClock::new();
        let now = clock.now();
        let mut rng = rand::thread_rng();
        let targets = refresh_targets(
            &table,
            &clock,
            Duration::from_secs(3600),
            |bucket| if bucket == 5 { Some(now) } else { None },
            &mut rng,
        );
        assert_eq!(targets.len(), NUM_BUCKETS - 1);
    }

    #[test]
    fn closest_bucket_refreshes_with_local_id() {
        let local = NodeId::from([0x11; 32]);
        let table = RoutingTable::new(local);
        let clock = ManualClock::new();
        let mut rng = rand::thread_rng();
        let targets = refresh_targets(
            &table,
            &clock,
            Duration::from_secs(3600),
            |bucket| if bucket == NUM_BUCKETS - 1 { None } else { Some(clock.now()) },
            &mut rng,
        );
        assert_eq!(targets, vec![local]);
    }
}
