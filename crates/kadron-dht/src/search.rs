//! Iterative node lookup driving Store/FindNode/FindValue (section 4.2).
//!
//! The algorithm is transport-agnostic: callers supply a [`SearchTransport`]
//! that knows how to actually put a FIND_NODE/FIND_VALUE/STORE packet on the
//! wire and await a reply. `run_search` owns only the shortlist bookkeeping,
//! round pacing and convergence detection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kadron_routing::NodeInfo;
use kadron_types::{Clock, NodeId, NODE_ID_BYTES};
use tracing::{debug, trace};

use crate::shortlist::ShortList;
use crate::{DhtError, Result, ALPHA};

/// Parse a wire-supplied DHT key into a [`NodeId`], rejecting anything that
/// isn't exactly `B/8` bytes (section 4.2's "an invalid key ... fails
/// immediately").
pub fn parse_key(key: &[u8]) -> Result<NodeId> {
    let bytes: [u8; NODE_ID_BYTES] =
        key.try_into().map_err(|_| DhtError::InvalidKeyLength {
            expected: NODE_ID_BYTES,
            actual: key.len(),
        })?;
    Ok(NodeId::from_bytes(bytes))
}

/// What kind of lookup is being driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchAction {
    FindNode,
    FindValue,
    StoreProbe,
}

/// Tunables for a single [`run_search`] call.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub alpha: usize,
    pub per_node_timeout: Duration,
    pub overall_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            alpha: ALPHA,
            per_node_timeout: Duration::from_secs(2),
            overall_timeout: Duration::from_secs(20),
        }
    }
}

/// Terminal result of a search.
#[derive(Clone)]
pub enum SearchOutcome {
    /// FindNode (or a StoreProbe after announcing): the closest nodes found.
    Nodes(Vec<NodeInfo>),
    /// FindValue located a value.
    Value { value: Vec<u8>, from: NodeId },
    /// FindValue exhausted the search without finding a value.
    NotFound,
    /// Cancelled via the termination flag before converging.
    Cancelled,
}

/// What a single FIND_VALUE reply carries.
#[derive(Clone, Debug)]
pub enum FindValueResult {
    /// Nodes merely closer to the key than the replying node.
    CloserNodes(Vec<NodeInfo>),
    /// Nodes the replying node believes are storing the value themselves —
    /// these get priority over `CloserNodes` candidates in the shortlist.
    StoringNodes(Vec<NodeInfo>),
    Value(Vec<u8>),
}

/// Send hooks a caller must supply so `run_search` can stay transport-agnostic.
///
/// Errors are swallowed by the caller's implementation (a failed send should
/// just surface as "no reply"); `run_search` treats a `None`/timeout
/// identically to an explicit empty node list.
pub trait SearchTransport {
    fn send_find_node(
        &self,
        peer: &NodeInfo,
        target: NodeId,
    ) -> impl std::future::Future<Output = Option<Vec<NodeInfo>>> + Send;

    fn send_find_value(
        &self,
        peer: &NodeInfo,
        key: NodeId,
    ) -> impl std::future::Future<Output = Option<FindValueResult>> + Send;

    fn send_store(
        &self,
        peer: &NodeInfo,
        key: NodeId,
        value: Vec<u8>,
    ) -> impl std::future::Future<Output = ()> + Send;
}

async fn wait_cancelled(flag: &AtomicBool) {
    loop {
        if flag.load(Ordering::Relaxed) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn query_one<T: SearchTransport>(
    transport: &T,
    action: SearchAction,
    target: NodeId,
    peer: NodeInfo,
    per_node_timeout: Duration,
    terminate: &AtomicBool,
) -> (NodeInfo, Option<FindValueResult>) {
    let fut = async {
        match action {
            SearchAction::FindNode | SearchAction::StoreProbe => {
                let nodes = transport.send_find_node(&peer, target).await;
                nodes.map(FindValueResult::CloserNodes)
            }
            SearchAction::FindValue => transport.send_find_value(&peer, target).await,
        }
    };

    tokio::select! {
        result = tokio::time::timeout(per_node_timeout, fut) => {
            (peer, result.unwrap_or(None))
        }
        _ = wait_cancelled(terminate) => (peer, None),
    }
}

/// Drive an iterative Kademlia lookup.
///
/// `on_discovered` is called once per newly discovered node (for routing
/// table insertion); it must not block.
pub async fn run_search<T, C, F>(
    action: SearchAction,
    target: NodeId,
    seed: Vec<NodeInfo>,
    transport: &T,
    clock: &C,
    config: &SearchConfig,
    mut on_discovered: F,
    terminate: &AtomicBool,
) -> SearchOutcome
where
    T: SearchTransport,
    C: Clock,
    F: FnMut(&NodeInfo),
{
    if seed.is_empty() {
        return match action {
            SearchAction::FindValue => SearchOutcome::NotFound,
            _ => SearchOutcome::Nodes(Vec::new()),
        };
    }

    let started = clock.now();
    let mut list = ShortList::new(target, seed);

    loop {
        if terminate.load(Ordering::Relaxed) {
            return SearchOutcome::Cancelled;
        }
        if clock.now().duration_since(started) >= config.overall_timeout {
            debug!("search overall timeout elapsed");
            break;
        }

        let round_head = list.head();
        let batch = list.next_batch(config.alpha);
        if batch.is_empty() {
            break;
        }

        let mut replies = Vec::with_capacity(batch.len());
        for peer in batch {
            let (peer, reply) = query_one(
                transport,
                action,
                target,
                peer,
                config.per_node_timeout,
                terminate,
            )
            .await;
            replies.push((peer, reply));
        }

        if terminate.load(Ordering::Relaxed) {
            return SearchOutcome::Cancelled;
        }

        let mut discovered = Vec::new();
        let mut storing = Vec::new();
        for (peer, reply) in replies {
            match reply {
                None => {
                    trace!(node = %peer.node_id, "search: no reply, dropping candidate");
                    list.remove(&peer.node_id);
                }
                Some(FindValueResult::Value(value)) => {
                    return SearchOutcome::Value {
                        value,
                        from: peer.node_id,
                    };
                }
                Some(FindValueResult::CloserNodes(nodes)) => {
                    for node in &nodes {
                        on_discovered(node);
                    }
                    discovered.extend(nodes);
                }
                Some(FindValueResult::StoringNodes(nodes)) => {
                    for node in &nodes {
                        on_discovered(node);
                    }
                    storing.extend(nodes);
                }
            }
        }
        list.merge(discovered);
        list.merge_storing(storing);

        let converged = list.head() == round_head;
        if converged && !list.has_uncontacted() {
            break;
        }
        if converged {
            // Head-of-shortlist unchanged: sweep every remaining
            // uncontacted candidate before declaring convergence.
            let rest = list.remaining_uncontacted();
            if rest.is_empty() {
                break;
            }
            let mut discovered = Vec::new();
            let mut storing = Vec::new();
            for peer in rest {
                let (peer, reply) = query_one(
                    transport,
                    action,
                    target,
                    peer,
                    config.per_node_timeout,
                    terminate,
                )
                .await;
                match reply {
                    None => list.remove(&peer.node_id),
                    Some(FindValueResult::Value(value)) => {
                        return SearchOutcome::Value {
                            value,
                            from: peer.node_id,
                        };
                    }
                    Some(FindValueResult::CloserNodes(nodes)) => {
                        for node in &nodes {
                            on_discovered(node);
                        }
                        discovered.extend(nodes);
                    }
                    Some(FindValueResult::StoringNodes(nodes)) => {
                        for node in &nodes {
                            on_discovered(node);
                        }
                        storing.extend(nodes);
                    }
                }
            }
            list.merge(discovered);
            list.merge_storing(storing);
            break;
        }
    }

    match action {
        SearchAction::FindValue => SearchOutcome::NotFound,
        SearchAction::FindNode => SearchOutcome::Nodes(list.top(kadron_routing::K)),
        SearchAction::StoreProbe => SearchOutcome::Nodes(list.top(kadron_routing::K)),
    }
}

/// Announce a value to the top `min(K, len)` nodes of a completed StoreProbe.
pub async fn announce<T: SearchTransport>(
    transport: &T,
    targets: &[NodeInfo],
    key: NodeId,
    value: &[u8],
) {
    for peer in targets {
        transport.send_store(peer, key, value.to_vec()).await;
    }
}


impl std::fmt::Debug for SearchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchOutcome::Nodes(nodes) => write!(f, "Nodes({} nodes)", nodes.len()),
            SearchOutcome::Value { from, .. } => write!(f, "Value(from={from})"),
            SearchOutcome::NotFound => write!(f, "NotFound"),
            SearchOutcome::Cancelled => write!(f, "Cancelled"),
        }
    }
}
