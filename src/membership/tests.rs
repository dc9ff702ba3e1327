//! Membership Module Tests
//!
//! ## Test Scopes
//! - **Data Structures**: wire encoding of nodes and gossip messages.
//! - **Service Logic**: joining, suspicion, refutation and failure detection.
//! - **Provider**: the address list handed to the routing ring.

#[cfg(test)]
mod tests {
    use crate::membership::{GossipMembership, GossipMessage, GossipTimings, Node, NodeState};
    use crate::routing::MembershipProvider;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};
    use tokio::net::UdpSocket;

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn fast_timings() -> GossipTimings {
        GossipTimings {
            gossip_interval: Duration::from_millis(50),
            failure_check_interval: Duration::from_millis(50),
            suspect_timeout: Duration::from_secs(5),
            dead_timeout: Duration::from_secs(10),
        }
    }

    /// A bound socket standing in for a peer, so acks have somewhere to go.
    async fn peer_socket() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind(local()).await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn join_peer(service: &GossipMembership, address: &str, src: SocketAddr) {
        let node = Node::new(address, src);
        service
            .handle_message(GossipMessage::Join { node }, src)
            .await
            .unwrap();
    }

    // ============================================================
    // WIRE FORMAT
    // ============================================================

    #[test]
    fn test_node_bincode_serialization() {
        let mut node = Node::new("10.0.0.1:5837", "10.0.0.1:7946".parse().unwrap());
        node.state = NodeState::Suspect;
        node.incarnation = 100;

        let encoded = bincode::serialize(&node).expect("Bincode serialization failed");
        let restored: Node = bincode::deserialize(&encoded).expect("Bincode deserialization failed");

        assert_eq!(restored.address, "10.0.0.1:5837");
        assert_eq!(restored.gossip_addr, node.gossip_addr);
        assert_eq!(restored.state, NodeState::Suspect);
        assert_eq!(restored.incarnation, 100);
        // last_seen is local bookkeeping and never travels.
        assert!(restored.last_seen.is_none());
    }

    #[test]
    fn test_gossip_ack_serialization() {
        let msg = GossipMessage::Ack {
            from: "responder:5837".to_string(),
            incarnation: 10,
            members: vec![
                Node::new("a:5837", "127.0.0.1:7001".parse().unwrap()),
                Node::new("b:5837", "127.0.0.1:7002".parse().unwrap()),
            ],
        };

        let encoded = bincode::serialize(&msg).expect("Failed to serialize Ack");
        let decoded: GossipMessage =
            bincode::deserialize(&encoded).expect("Failed to deserialize Ack");

        if let GossipMessage::Ack {
            from,
            incarnation,
            members,
        } = decoded
        {
            assert_eq!(from, "responder:5837");
            assert_eq!(incarnation, 10);
            assert_eq!(members.len(), 2);
            assert_eq!(members[1].address, "b:5837");
        } else {
            panic!("Wrong message type");
        }
    }

    // ============================================================
    // SERVICE
    // ============================================================

    #[tokio::test]
    async fn test_membership_service_creation() {
        let service = GossipMembership::new("127.0.0.1:5837", local(), vec![])
            .await
            .expect("Failed to create service");

        assert_eq!(service.members.len(), 1);
        assert_ne!(service.local_node.gossip_addr.port(), 0);
        assert_eq!(service.members(), vec!["127.0.0.1:5837".to_string()]);

        let me = service.get_member("127.0.0.1:5837").unwrap();
        assert_eq!(me.state, NodeState::Alive);
        assert!(service.get_member("unknown:1").is_none());
    }

    #[tokio::test]
    async fn test_join_registers_member_and_answers_with_table() {
        let service = GossipMembership::new("a:5837", local(), vec![]).await.unwrap();
        let (peer, peer_addr) = peer_socket().await;

        join_peer(&service, "b:5837", peer_addr).await;

        let mut members = service.members();
        members.sort();
        assert_eq!(members, vec!["a:5837".to_string(), "b:5837".to_string()]);

        let mut buf = vec![0u8; 65536];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        match bincode::deserialize::<GossipMessage>(&buf[..len]).unwrap() {
            GossipMessage::Ack { from, members, .. } => {
                assert_eq!(from, "a:5837");
                assert_eq!(members.len(), 2);
            }
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_services_discover_each_other() {
        let first = GossipMembership::with_timings("a:5837", local(), vec![], fast_timings())
            .await
            .unwrap();
        let second = GossipMembership::with_timings(
            "b:5837",
            local(),
            vec![first.local_node.gossip_addr],
            fast_timings(),
        )
        .await
        .unwrap();

        let handles: Vec<_> = first
            .clone()
            .start()
            .into_iter()
            .chain(second.clone().start())
            .collect();

        let deadline = Instant::now() + Duration::from_secs(5);
        while (first.members().len() < 2 || second.members().len() < 2) && Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let mut seen_by_first = first.members();
        seen_by_first.sort();
        let mut seen_by_second = second.members();
        seen_by_second.sort();
        assert_eq!(seen_by_first, vec!["a:5837".to_string(), "b:5837".to_string()]);
        assert_eq!(seen_by_first, seen_by_second);

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_suspect_then_alive_with_higher_incarnation() {
        let service = GossipMembership::new("a:5837", local(), vec![]).await.unwrap();
        let (_peer, peer_addr) = peer_socket().await;
        join_peer(&service, "b:5837", peer_addr).await;

        service
            .handle_message(
                GossipMessage::Suspect {
                    address: "b:5837".to_string(),
                    incarnation: 1,
                },
                peer_addr,
            )
            .await
            .unwrap();
        assert_eq!(service.get_member("b:5837").unwrap().state, NodeState::Suspect);
        assert_eq!(service.members(), vec!["a:5837".to_string()]);

        // A stale alive report does not clear the suspicion.
        service
            .handle_message(
                GossipMessage::Alive {
                    address: "b:5837".to_string(),
                    incarnation: 0,
                },
                peer_addr,
            )
            .await
            .unwrap();
        assert_eq!(service.get_member("b:5837").unwrap().state, NodeState::Suspect);

        service
            .handle_message(
                GossipMessage::Alive {
                    address: "b:5837".to_string(),
                    incarnation: 2,
                },
                peer_addr,
            )
            .await
            .unwrap();
        let member = service.get_member("b:5837").unwrap();
        assert_eq!(member.state, NodeState::Alive);
        assert_eq!(member.incarnation, 2);
    }

    #[tokio::test]
    async fn test_suspicion_about_self_is_refuted() {
        let service = GossipMembership::new("a:5837", local(), vec![]).await.unwrap();
        let (_peer, peer_addr) = peer_socket().await;
        assert_eq!(service.incarnation(), 1);

        service
            .handle_message(
                GossipMessage::Suspect {
                    address: "a:5837".to_string(),
                    incarnation: 1,
                },
                peer_addr,
            )
            .await
            .unwrap();

        assert_eq!(service.incarnation(), 2);
        let me = service.get_member("a:5837").unwrap();
        assert_eq!(me.state, NodeState::Alive);
        assert_eq!(me.incarnation, 2);
    }

    #[tokio::test]
    async fn test_failure_detector_suspects_then_buries() {
        let service = GossipMembership::with_timings("a:5837", local(), vec![], fast_timings())
            .await
            .unwrap();
        let (_peer, peer_addr) = peer_socket().await;
        join_peer(&service, "b:5837", peer_addr).await;

        let now = Instant::now();
        assert!(service.detect_failures(now).is_empty());

        let suspicions = service.detect_failures(now + Duration::from_secs(6));
        assert_eq!(suspicions.len(), 1);
        assert!(matches!(
            &suspicions[0],
            GossipMessage::Suspect { address, .. } if address == "b:5837"
        ));
        assert_eq!(service.get_member("b:5837").unwrap().state, NodeState::Suspect);

        assert!(service.detect_failures(now + Duration::from_secs(20)).is_empty());
        assert_eq!(service.get_member("b:5837").unwrap().state, NodeState::Dead);

        // The local node is never judged.
        assert_eq!(service.get_member("a:5837").unwrap().state, NodeState::Alive);
    }

    #[tokio::test]
    async fn test_dead_members_are_not_learned_from_gossip() {
        let service = GossipMembership::new("a:5837", local(), vec![]).await.unwrap();
        let (_peer, peer_addr) = peer_socket().await;

        let mut dead = Node::new("ghost:5837", peer_addr);
        dead.state = NodeState::Dead;
        let mut alive = Node::new("c:5837", peer_addr);
        alive.incarnation = 3;

        service
            .handle_message(
                GossipMessage::Ack {
                    from: "b:5837".to_string(),
                    incarnation: 1,
                    members: vec![dead, alive],
                },
                peer_addr,
            )
            .await
            .unwrap();

        assert!(service.get_member("ghost:5837").is_none());
        assert_eq!(service.get_member("c:5837").unwrap().incarnation, 3);
    }
}
