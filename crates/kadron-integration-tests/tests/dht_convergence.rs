//! End-to-end FindNode convergence across a small peer graph, driving
//! `kadron_dht::run_search` the way a real node would: each hop only
//! knows the peers it has been introduced to, and the search must walk
//! the graph to reach the target.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use kadron_dht::{run_search, SearchAction, SearchConfig, SearchOutcome};
use kadron_routing::NodeInfo;
use kadron_types::{NodeId, SystemClock};

fn node(byte: u8) -> NodeInfo {
    let mut bytes = [0u8; 32];
    bytes[31] = byte;
    NodeInfo {
        node_id: NodeId::from_bytes(bytes),
        addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9000 + byte as u16)),
        public_key: [byte; 33],
        last_seen: Instant::now(),
    }
}

struct GraphTransport {
    edges: HashMap<NodeId, Vec<NodeInfo>>,
}

impl kadron_dht::SearchTransport for GraphTransport {
    async fn send_find_node(&self, peer: &NodeInfo, _target: NodeId) -> Option<Vec<NodeInfo>> {
        self.edges.get(&peer.node_id).cloned()
    }

    async fn send_find_value(
        &self,
        _peer: &NodeInfo,
        _key: NodeId,
    ) -> Option<kadron_dht::FindValueResult> {
        None
    }

    async fn send_store(&self, _peer: &NodeInfo, _key: NodeId, _value: Vec<u8>) {}
}

#[tokio::test]
async fn find_node_reaches_target_across_a_relay_chain() {
    // A knows only B. B knows C. C knows the target D directly.
    let a = node(1);
    let b = node(2);
    let c = node(3);
    let d = node(4);

    let mut edges = HashMap::new();
    edges.insert(a.node_id, vec![b.clone()]);
    edges.insert(b.node_id, vec![c.clone()]);
    edges.insert(c.node_id, vec![d.clone()]);
    let transport = GraphTransport { edges };

    let clock = SystemClock;
    let terminate = AtomicBool::new(false);
    let outcome = run_search(
        SearchAction::FindNode,
        d.node_id,
        vec![b],
        &transport,
        &clock,
        &SearchConfig::default(),
        |_discovered| {},
        &terminate,
    )
    .await;

    match outcome {
        SearchOutcome::Nodes(nodes) => {
            assert!(
                nodes.iter().any(|n| n.node_id == d.node_id),
                "search must discover the target by walking the relay chain"
            );
        }
        other => panic!("expected Nodes outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn find_node_with_no_path_returns_whatever_was_reachable() {
    let a = node(1);
    let isolated_target = node(99);

    // A has no edges at all; the target is unreachable from the seed.
    let transport = GraphTransport {
        edges: HashMap::new(),
    };
    let clock = SystemClock;
    let terminate = AtomicBool::new(false);
    let outcome = run_search(
        SearchAction::FindNode,
        isolated_target.node_id,
        vec![a.clone()],
        &transport,
        &clock,
        &SearchConfig::default(),
        |_discovered| {},
        &terminate,
    )
    .await;

    match outcome {
        SearchOutcome::Nodes(nodes) => {
            assert!(nodes.iter().any(|n| n.node_id == a.node_id));
        }
        other => panic!("expected Nodes outcome, got {other:?}"),
    }
}
