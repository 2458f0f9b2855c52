//! Deterministic host election.
//!
//! Every participant that notices the host is gone runs the same pure
//! function over its local player list. With identical lists they agree
//! without exchanging a single message; the winner then announces itself
//! with `host_migration`.

use meshroom_protocol::PeerId;

/// Picks the host among `players`: the lexicographically smallest id.
pub fn elect_host(players: &[PeerId]) -> Option<PeerId> {
    players.iter().min().cloned()
}

/// What this peer should do after its host disappeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Migration {
    /// This peer won the election.
    PromoteSelf,
    /// Another peer won; wait for its `host_migration`.
    Follow(PeerId),
}

/// Runs the election over `players` without `departed`.
///
/// `self_id` is always a candidate, even if the local list somehow lost
/// it, so the result is never empty.
pub fn plan_migration(
    players: &[PeerId],
    departed: &PeerId,
    self_id: &PeerId,
) -> Migration {
    let mut candidates: Vec<PeerId> = players
        .iter()
        .filter(|p| *p != departed)
        .cloned()
        .collect();
    if !candidates.contains(self_id) {
        candidates.push(self_id.clone());
    }
    match elect_host(&candidates) {
        Some(winner) if winner != *self_id => Migration::Follow(winner),
        _ => Migration::PromoteSelf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pids(ids: &[&str]) -> Vec<PeerId> {
        ids.iter().map(|s| PeerId::new(*s)).collect()
    }

    #[test]
    fn test_elect_host_picks_smallest() {
        let players = pids(&["carol", "alice", "bob"]);
        assert_eq!(elect_host(&players), Some(PeerId::new("alice")));
    }

    #[test]
    fn test_elect_host_empty() {
        assert_eq!(elect_host(&[]), None);
    }

    #[test]
    fn test_elect_host_is_order_independent() {
        let a = pids(&["d", "b", "c", "e"]);
        let mut b = a.clone();
        b.reverse();
        assert_eq!(elect_host(&a), elect_host(&b));
    }

    #[test]
    fn test_plan_migration_excludes_departed() {
        let players = pids(&["alice", "bob", "carol"]);
        let alice = PeerId::new("alice");
        assert_eq!(
            plan_migration(&players, &alice, &PeerId::new("bob")),
            Migration::PromoteSelf
        );
        assert_eq!(
            plan_migration(&players, &alice, &PeerId::new("carol")),
            Migration::Follow(PeerId::new("bob"))
        );
    }

    #[test]
    fn test_plan_migration_counts_self_even_if_missing() {
        let players = pids(&["alice"]);
        assert_eq!(
            plan_migration(&players, &PeerId::new("alice"), &PeerId::new("zed")),
            Migration::PromoteSelf
        );
    }

    #[test]
    fn test_all_survivors_agree() {
        let players = pids(&["p3", "p1", "p4", "p2"]);
        let departed = PeerId::new("p1");
        for me in &players[..] {
            if *me == departed {
                continue;
            }
            let expected = if me.as_str() == "p2" {
                Migration::PromoteSelf
            } else {
                Migration::Follow(PeerId::new("p2"))
            };
            assert_eq!(plan_migration(&players, &departed, me), expected);
        }
    }
}
