//! Routing Module Tests
//!
//! ## Test Scopes
//! - **Ring**: placement formula, wrap-around, duplicate handling, balance.
//! - **Router**: ownership lookups, refresh from a provider, empty clusters.
//! - **Redirects**: message format in both directions.

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::routing::{
        HashRing, MembershipProvider, Router, StaticMembership, parse_redirect, redirect_message,
    };
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// Membership whose list can be changed from the test.
    struct MutableMembership(Mutex<Vec<String>>);

    impl MembershipProvider for MutableMembership {
        fn members(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    fn nodes(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("10.0.0.{}:5837", i + 1)).collect()
    }

    // ============================================================
    // RING
    // ============================================================

    #[test]
    fn test_empty_ring_has_no_owner() {
        let ring = HashRing::build(Vec::<String>::new(), 16);
        assert!(ring.is_empty());
        assert_eq!(ring.get("anything"), None);
    }

    #[test]
    fn test_single_member_owns_everything() {
        let ring = HashRing::build(vec!["127.0.0.1:5837"], 8);
        for i in 0..100 {
            assert_eq!(ring.get(&format!("key_{}", i)), Some("127.0.0.1:5837"));
        }
    }

    #[test]
    fn test_ring_placement_formula() {
        // One point per member, so the owner can be computed by hand.
        let members = ["alpha:1", "beta:2", "gamma:3"];
        let ring = HashRing::build(members, 1);

        let mut points: Vec<(u32, &str)> = members
            .iter()
            .map(|m| (crc32fast::hash(format!("0{}", m).as_bytes()), *m))
            .collect();
        points.sort();

        for i in 0..500 {
            let key = format!("user:{}", i);
            let hash = crc32fast::hash(key.as_bytes());
            let expected = points
                .iter()
                .find(|(point, _)| *point > hash)
                .unwrap_or(&points[0])
                .1;
            assert_eq!(ring.get(&key), Some(expected), "key {}", key);
        }
    }

    #[test]
    fn test_key_on_a_point_belongs_to_the_next_point() {
        let members = ["alpha:1", "beta:2", "gamma:3"];
        let ring = HashRing::build(members, 1);

        let mut points: Vec<(u32, &str)> = members
            .iter()
            .map(|m| (crc32fast::hash(format!("0{}", m).as_bytes()), *m))
            .collect();
        points.sort();

        // The key "0<member>" hashes exactly onto that member's only point.
        for (index, (_, member)) in points.iter().enumerate() {
            let key = format!("0{}", member);
            let next = points[(index + 1) % points.len()].1;
            assert_eq!(ring.get(&key), Some(next), "key {}", key);
        }
    }

    #[test]
    fn test_binary_keys_are_routed() {
        let ring = HashRing::build(nodes(3), 16);
        let key = [0xffu8, 0xfe, 0x00];
        assert!(ring.get(key).is_some());
        assert_eq!(ring.get(key), ring.get(key.to_vec()));
    }

    #[test]
    fn test_duplicate_members_are_collapsed() {
        let ring = HashRing::build(vec!["b:1", "a:1", "b:1"], 4);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.members(), &["a:1".to_string(), "b:1".to_string()]);

        let same = HashRing::build(vec!["a:1", "b:1"], 4);
        for i in 0..200 {
            let key = format!("k{}", i);
            assert_eq!(ring.get(&key), same.get(&key));
        }
    }

    #[test]
    fn test_member_order_does_not_change_ownership() {
        let forward = HashRing::build(nodes(5), 64);
        let mut reversed_members = nodes(5);
        reversed_members.reverse();
        let reversed = HashRing::build(reversed_members, 64);

        for i in 0..1000 {
            let key = format!("order_{}", i);
            assert_eq!(forward.get(&key), reversed.get(&key));
        }
    }

    #[test]
    fn test_keys_spread_over_all_members() {
        let ring = HashRing::build(nodes(4), 1024);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for i in 0..10_000 {
            let owner = ring.get(&format!("spread_{}", i)).unwrap();
            *counts.entry(owner.to_string()).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        for (node, count) in counts {
            assert!(count > 1_000, "{} owns only {} of 10000 keys", node, count);
        }
    }

    #[test]
    fn test_adding_member_only_moves_keys_to_it() {
        let before = HashRing::build(nodes(3), 256);
        let after = HashRing::build(nodes(4), 256);
        let newcomer = &nodes(4)[3];

        let mut moved = 0;
        for i in 0..5_000 {
            let key = format!("move_{}", i);
            let old_owner = before.get(&key).unwrap();
            let new_owner = after.get(&key).unwrap();
            if old_owner != new_owner {
                assert_eq!(new_owner, newcomer);
                moved += 1;
            }
        }
        assert!(moved > 0);
    }

    // ============================================================
    // ROUTER
    // ============================================================

    #[test]
    fn test_router_owner_and_self_check() {
        let membership = Arc::new(StaticMembership::new(nodes(3)));
        let router = Router::new("10.0.0.1:5837", 128, membership);

        assert_eq!(router.members(), nodes(3));
        assert!(router.is_self("10.0.0.1:5837"));
        assert!(!router.is_self("10.0.0.2:5837"));

        let ring = HashRing::build(nodes(3), 128);
        for i in 0..100 {
            let key = format!("route_{}", i);
            assert_eq!(router.owner(&key).unwrap(), ring.get(&key).unwrap());
        }
    }

    #[test]
    fn test_router_without_members_reports_no_node() {
        let router = Router::new("127.0.0.1:5837", 16, Arc::new(StaticMembership::default()));
        assert!(matches!(router.owner("key"), Err(Error::NoAvailableNode)));
    }

    #[test]
    fn test_router_refresh_picks_up_membership_changes() {
        let membership = Arc::new(MutableMembership(Mutex::new(vec!["a:1".to_string()])));
        let router = Router::new("a:1", 32, membership.clone());
        assert_eq!(router.members(), vec!["a:1".to_string()]);

        let old_ring = router.ring();
        membership.0.lock().push("b:2".to_string());
        router.refresh();

        assert_eq!(router.members(), vec!["a:1".to_string(), "b:2".to_string()]);
        // Snapshots handed out earlier are unaffected.
        assert_eq!(old_ring.len(), 1);
    }

    #[tokio::test]
    async fn test_periodic_refresh() {
        let membership = Arc::new(MutableMembership(Mutex::new(Vec::new())));
        let router = Router::new("a:1", 8, membership.clone());
        let handle = router.clone().spawn_refresh(Duration::from_millis(20));

        membership.0.lock().push("a:1".to_string());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(router.owner("k").unwrap(), "a:1");
        handle.abort();
    }

    // ============================================================
    // REDIRECTS
    // ============================================================

    #[test]
    fn test_redirect_message_format() {
        let message = redirect_message("10.0.0.7:5837");
        assert_eq!(message, "redirect to node 10.0.0.7:5837");
        assert_eq!(parse_redirect(&message), Some("10.0.0.7:5837"));

        let typed = Error::RedirectRequired {
            owner: "10.0.0.7:5837".to_string(),
        };
        assert_eq!(typed.to_string(), message);
    }

    #[test]
    fn test_parse_redirect_rejects_other_messages() {
        assert_eq!(parse_redirect("not found"), None);
        assert_eq!(parse_redirect("redirect to node "), None);
        assert_eq!(parse_redirect("Redirect to node x:1"), None);
    }
}
