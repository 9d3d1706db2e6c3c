use actix::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregator::{Aggregator, DropChain, NodeCount, RenameChain};
use crate::feed::connector::{FeedConnector, FeedId, Subscribed, Unsubscribed};
use crate::feed::{self, FeedMessageSerializer};
use crate::node::connector::{Initialize, NodeConnector};
use crate::node::message::Payload;
use crate::node::Node;
use crate::types::{Address, Block, BlockNumber, NodeDetails, NodeId, NodeLocation, Timestamp};
use crate::util::{now, Hash, NumStats};

pub mod consensus;
pub mod stats;

use consensus::{ConsensusMatrix, VoteKind};
use stats::ChainStatsCollator;

/// No best-block advance for this long marks a node (not the chain) stale.
const NO_BLOCK_TIMEOUT: u64 = 60 * 1000;

pub type ChainId = usize;
pub type Label = Arc<str>;

#[derive(Clone, PartialEq)]
struct CachedAuthoritySet {
    set_id: Address,
    authorities: Box<[Address]>,
    this_addr: Address,
    number: BlockNumber,
    hash: crate::types::BlockHash,
}

pub struct Chain {
    cid: ChainId,
    genesis_hash: Hash,
    aggregator: Addr<Aggregator>,
    label: (Label, usize),
    nodes: HashMap<NodeId, Node>,
    feeds: HashMap<FeedId, Addr<FeedConnector>>,
    next_fid: FeedId,
    finality_feeds: FxHashMap<FeedId, Addr<FeedConnector>>,
    best: Block,
    finalized: Block,
    block_times: NumStats<u64>,
    average_block_time: Option<u64>,
    serializer: FeedMessageSerializer,
    timestamp: Option<Timestamp>,
    labels: HashMap<Label, usize>,
    authority_set: Option<CachedAuthoritySet>,
    consensus: ConsensusMatrix,
    chain_stats: ChainStatsCollator,
}

impl Chain {
    pub fn new(cid: ChainId, genesis_hash: Hash, aggregator: Addr<Aggregator>, label: Label) -> Self {
        log::info!("[{}] Created", label);

        Chain {
            cid,
            genesis_hash,
            aggregator,
            label: (label, 0),
            nodes: HashMap::new(),
            feeds: HashMap::new(),
            next_fid: 0,
            finality_feeds: FxHashMap::default(),
            best: Block::zero(),
            finalized: Block::zero(),
            block_times: NumStats::new(10),
            average_block_time: None,
            serializer: FeedMessageSerializer::new(),
            timestamp: None,
            labels: HashMap::default(),
            authority_set: None,
            consensus: ConsensusMatrix::new(),
            chain_stats: ChainStatsCollator::default(),
        }
    }

    fn increment_label_count(&mut self, label: &str) {
        let count = match self.labels.get_mut(label) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                self.labels.insert(label.into(), 1);
                1
            }
        };

        if &*self.label.0 == label {
            self.label.1 += 1;
        } else if count > self.label.1 {
            self.rename(label.into(), count);
        }
    }

    fn decrement_label_count(&mut self, label: &str) {
        match self.labels.get_mut(label) {
            Some(count) => *count -= 1,
            None => return,
        };

        if &*self.label.0 == label {
            self.label.1 -= 1;

            for (label, &count) in self.labels.iter() {
                if count > self.label.1 {
                    let label: Arc<_> = label.clone();
                    self.rename(label, count);
                    break;
                }
            }
        }
    }

    fn rename(&mut self, label: Label, count: usize) {
        self.label = (label, count);

        self.aggregator
            .do_send(RenameChain(self.cid, self.label.0.clone()));
    }

    fn broadcast(&mut self) {
        if let Some(msg) = self.serializer.finalize() {
            for feed in self.feeds.values() {
                feed.do_send(msg.clone());
            }
        }
    }

    fn broadcast_finality(&mut self) {
        if let Some(msg) = self.serializer.finalize() {
            for feed in self.finality_feeds.values() {
                feed.do_send(msg.clone());
            }
        }
    }

    fn update_count(&self) {
        self.aggregator
            .do_send(NodeCount(self.cid, self.nodes.len()));
    }

    /// Recomputes `best`/`finalized` from the remaining non-stale nodes.
    /// The only place `best.height` may decrease.
    fn downgrade(&mut self) {
        let mut best = Block::zero();
        let mut finalized = Block::zero();
        let mut timestamp = None;

        for (_, node) in self.nodes.iter() {
            if node.stale() {
                continue;
            }

            if node.best().height > best.height {
                best = *node.best();
                timestamp = Some(node.best_timestamp());
            }

            if node.finalized().height > finalized.height {
                finalized = *node.finalized();
            }
        }

        if best.height != self.best.height || finalized.height != self.finalized.height {
            self.best = best;
            self.finalized = finalized;
            self.block_times.reset();
            self.average_block_time = None;
            self.timestamp = timestamp;

            self.serializer.push(feed::BestBlock(
                self.best.height,
                timestamp.unwrap_or_else(now),
                None,
            ));
            self.serializer
                .push(feed::BestFinalized(finalized.height, finalized.hash));
        }
    }

    /// Driven by the Aggregator's 10s timer: marks nodes stale once they've
    /// gone `NO_BLOCK_TIMEOUT` without a new best block, downgrades the
    /// chain's own best/finalized if needed, and syncs feed clocks.
    fn tick(&mut self, now: u64) {
        let threshold = now.saturating_sub(NO_BLOCK_TIMEOUT);
        let mut newly_stale = false;

        for (&nid, node) in self.nodes.iter_mut() {
            let was_stale = node.stale();
            if node.update_stale(threshold) && !was_stale {
                self.serializer.push(feed::StaleNode(nid));
                newly_stale = true;
            }
        }

        if newly_stale {
            self.downgrade();
        }

        self.serializer.push(feed::TimeSync(now));
        self.broadcast();
    }

    fn handle_block(&mut self, block: &Block, nid: NodeId) {
        let moment = now();
        let nodes_len = self.nodes.len();

        let updated = match self.nodes.get_mut(&nid) {
            Some(node) => node.update_block(*block),
            None => return,
        };

        if !updated {
            return;
        }

        let mut propagation_time = None;
        let mut new_best = false;

        if block.height > self.best.height {
            new_best = true;
            self.best = *block;
            log::debug!(
                "[{}] [nodes={}/feeds={}] new best block={}/{:?}",
                self.label.0,
                nodes_len,
                self.feeds.len(),
                self.best.height,
                self.best.hash,
            );
            if let Some(timestamp) = self.timestamp {
                self.block_times.push(moment.saturating_sub(timestamp));
                self.average_block_time = Some(self.block_times.average());
            }
            self.timestamp = Some(moment);
            self.serializer.push(feed::BestBlock(
                self.best.height,
                moment,
                self.average_block_time,
            ));
            propagation_time = Some(0);
        } else if block.height == self.best.height {
            if let Some(timestamp) = self.timestamp {
                propagation_time = Some(moment.saturating_sub(timestamp));
            }
        }

        if new_best {
            for (&other_nid, other) in self.nodes.iter_mut() {
                if other_nid != nid {
                    other.clear_propagation_time();
                }
            }
        }

        if let Some(node) = self.nodes.get_mut(&nid) {
            if let Some(details) = node.update_details(moment, propagation_time) {
                self.serializer.push(feed::ImportedBlock(nid, details));
            }
        }
    }
}

impl Actor for Chain {
    type Context = Context<Self>;

    fn stopped(&mut self, _: &mut Self::Context) {
        self.aggregator.do_send(DropChain(self.cid));

        for feed in self.feeds.values() {
            feed.do_send(Unsubscribed)
        }
    }
}

/// Sent from the Aggregator to the Chain once a node's stable id has been
/// assigned.
#[derive(Message)]
#[rtype(result = "()")]
pub struct AddNode {
    pub nid: NodeId,
    pub node: NodeDetails,
    pub node_connector: Addr<NodeConnector>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateNode {
    pub nid: NodeId,
    pub payload: Payload,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct RemoveNode(pub NodeId);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Subscribe(pub Addr<FeedConnector>);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Unsubscribe(pub FeedId);

#[derive(Message)]
#[rtype(result = "()")]
pub struct SendFinality(pub FeedId);

#[derive(Message)]
#[rtype(result = "()")]
pub struct NoMoreFinality(pub FeedId);

#[derive(Message)]
#[rtype(result = "()")]
pub struct LocateNode {
    pub nid: NodeId,
    pub location: Arc<NodeLocation>,
}

/// Sent by the Aggregator's 10s periodic timer.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Tick;

/// Returns the opaque `network_state` blob reported by a node, if any.
#[derive(Message)]
#[rtype(result = "Option<Box<serde_json::value::RawValue>>")]
pub struct GetNetworkState(pub NodeId);

impl Handler<AddNode> for Chain {
    type Result = ();

    fn handle(&mut self, msg: AddNode, ctx: &mut Self::Context) {
        let AddNode {
            nid,
            node,
            node_connector,
        } = msg;

        log::trace!(
            target: "Chain::AddNode",
            "New node connected. Chain '{}', node count goes from {} to {}",
            node.chain,
            self.nodes.len(),
            self.nodes.len() + 1
        );

        self.increment_label_count(&node.chain);
        self.chain_stats
            .add_or_remove_node(&node, crate::util::counter::CounterValue::Increment);

        self.nodes.insert(nid, Node::new(node));
        let chain = ctx.address();

        let initialized = node_connector
            .try_send(Initialize { nid, chain })
            .is_ok();

        if !initialized {
            self.nodes.remove(&nid);
        } else if let Some(node) = self.nodes.get(&nid) {
            self.serializer.push(feed::AddedNode(nid, node));
            self.serializer
                .push(feed::ChainStatsUpdate(&self.chain_stats.generate()));
            self.broadcast();
        }

        self.update_count();
    }
}

impl Handler<UpdateNode> for Chain {
    type Result = ();

    fn handle(&mut self, msg: UpdateNode, _: &mut Self::Context) {
        let UpdateNode { nid, payload } = msg;
        let mut finality_update = false;

        if let Some(block) = payload.best_block() {
            self.handle_block(block, nid);
        }

        let finalized_block = payload.finalized_block();

        if let Some(node) = self.nodes.get_mut(&nid) {
            match payload {
                Payload::SystemInterval(ref interval) => {
                    if node.update_hardware(interval) {
                        self.serializer.push(feed::Hardware(nid, node.hardware()));
                    }

                    if let Some(stats) = node.update_stats(interval) {
                        self.serializer.push(feed::NodeStatsUpdate(nid, stats));
                    }

                    if let Some(io) = node.update_io(interval) {
                        self.serializer.push(feed::NodeIOUpdate(nid, io));
                    }
                }
                Payload::SystemNetworkState(state) => {
                    node.set_network_state(state.state);
                }
                Payload::AfgAuthoritySet(set) => {
                    node.set_validator_address(set.authority_id.clone());

                    let number: BlockNumber = set.number.parse().unwrap_or(0);
                    let authorities: Box<[Address]> =
                        serde_json::from_str::<Vec<Box<str>>>(&set.authorities)
                            .unwrap_or_default()
                            .into_boxed_slice();

                    let cached = CachedAuthoritySet {
                        set_id: set.authority_set_id.clone(),
                        authorities,
                        this_addr: set.authority_id.clone(),
                        number,
                        hash: set.hash,
                    };

                    if self.authority_set.as_ref() != Some(&cached) {
                        self.serializer.push(feed::AfgAuthoritySet {
                            set_id: cached.set_id.clone(),
                            authorities: cached.authorities.clone(),
                            this_addr: cached.this_addr.clone(),
                            number: cached.number,
                            hash: cached.hash,
                        });
                        self.authority_set = Some(cached);
                    }
                }
                Payload::AfgFinalized(ref finalized) => {
                    if let (Ok(height), Some(addr)) = (
                        finalized.finalized_number.parse::<BlockNumber>(),
                        node.details().validator.clone(),
                    ) {
                        self.consensus.record_finalized(&addr, height);
                        self.serializer
                            .push(feed::AfgFinalized(addr, height, finalized.finalized_hash));
                        finality_update = true;
                    }
                }
                Payload::AfgReceivedPrecommit(ref precommit) => {
                    if let (Ok(height), Some(addr)) = (
                        precommit.received.target_number.parse::<BlockNumber>(),
                        node.details().validator.clone(),
                    ) {
                        let voter = precommit.received.voter();
                        if let Some(voter_addr) = &voter {
                            self.consensus
                                .record_vote(&addr, voter_addr, height, VoteKind::Precommit);
                        }
                        self.serializer.push(feed::AfgReceivedPrecommit(
                            addr,
                            height,
                            precommit.received.target_hash,
                            voter,
                        ));
                        finality_update = true;
                    }
                }
                Payload::AfgReceivedPrevote(ref prevote) => {
                    if let (Ok(height), Some(addr)) = (
                        prevote.received.target_number.parse::<BlockNumber>(),
                        node.details().validator.clone(),
                    ) {
                        let voter = prevote.received.voter();
                        if let Some(voter_addr) = &voter {
                            self.consensus
                                .record_vote(&addr, voter_addr, height, VoteKind::Prevote);
                        }
                        self.serializer.push(feed::AfgReceivedPrevote(
                            addr,
                            height,
                            prevote.received.target_hash,
                            voter,
                        ));
                        finality_update = true;
                    }
                }
                Payload::AfgReceivedCommit(_) => (),
                _ => (),
            }

            if let Some(block) = finalized_block {
                if let Some(finalized) = node.update_finalized(block) {
                    self.serializer
                        .push(feed::FinalizedBlock(nid, finalized.height, finalized.hash));

                    if finalized.height > self.finalized.height {
                        self.finalized = *finalized;
                        self.serializer
                            .push(feed::BestFinalized(finalized.height, finalized.hash));
                        self.consensus.evict_below(finalized.height);
                    }
                }
            }
        }

        if finality_update {
            self.broadcast_finality();
        }
        self.broadcast();
    }
}

impl Handler<LocateNode> for Chain {
    type Result = ();

    fn handle(&mut self, msg: LocateNode, _: &mut Self::Context) {
        let LocateNode { nid, location } = msg;

        if let Some(node) = self.nodes.get_mut(&nid) {
            self.serializer.push(feed::LocatedNode(
                nid,
                location.latitude,
                location.longitude,
                &location.city,
            ));

            node.update_location(location);
            self.broadcast();
        }
    }
}

impl Handler<RemoveNode> for Chain {
    type Result = ();

    fn handle(&mut self, msg: RemoveNode, ctx: &mut Self::Context) {
        let RemoveNode(nid) = msg;

        if let Some(node) = self.nodes.remove(&nid) {
            self.decrement_label_count(&node.details().chain);
            self.chain_stats.add_or_remove_node(
                node.details(),
                crate::util::counter::CounterValue::Decrement,
            );
            self.serializer
                .push(feed::ChainStatsUpdate(&self.chain_stats.generate()));

            if node.best().height == self.best.height {
                self.downgrade();
            }
        }

        if self.nodes.is_empty() {
            log::info!("[{}] Lost all nodes, dropping...", self.label.0);
            ctx.stop();
        }

        self.serializer.push(feed::RemovedNode(nid));
        self.broadcast();
        self.update_count();
    }
}

impl Handler<Subscribe> for Chain {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, ctx: &mut Self::Context) {
        let Subscribe(feed) = msg;
        let fid = self.next_fid;
        self.next_fid += 1;
        self.feeds.insert(fid, feed.clone());

        feed.do_send(Subscribed(fid, ctx.address().recipient()));

        self.serializer.push(feed::TimeSync(now()));
        self.serializer.push(feed::BestBlock(
            self.best.height,
            self.timestamp.unwrap_or(0),
            self.average_block_time,
        ));
        self.serializer.push(feed::BestFinalized(
            self.finalized.height,
            self.finalized.hash,
        ));

        if let Some(cached) = &self.authority_set {
            self.serializer.push(feed::AfgAuthoritySet {
                set_id: cached.set_id.clone(),
                authorities: cached.authorities.clone(),
                this_addr: cached.this_addr.clone(),
                number: cached.number,
                hash: cached.hash,
            });
        }

        for (idx, (&nid, node)) in self.nodes.iter().enumerate() {
            if idx % 32 == 0 {
                if let Some(serialized) = self.serializer.finalize() {
                    feed.do_send(serialized);
                }
            }

            self.serializer.push(feed::AddedNode(nid, node));
            self.serializer.push(feed::FinalizedBlock(
                nid,
                node.finalized().height,
                node.finalized().hash,
            ));
            if node.stale() {
                self.serializer.push(feed::StaleNode(nid));
            }
        }

        if let Some(serialized) = self.serializer.finalize() {
            feed.do_send(serialized);
        }
    }
}

impl Handler<Tick> for Chain {
    type Result = ();

    fn handle(&mut self, _: Tick, _: &mut Self::Context) {
        self.tick(now());
    }
}

impl Handler<GetNetworkState> for Chain {
    type Result = Option<Box<serde_json::value::RawValue>>;

    fn handle(&mut self, msg: GetNetworkState, _: &mut Self::Context) -> Self::Result {
        let GetNetworkState(nid) = msg;
        self.nodes
            .get(&nid)
            .and_then(|node| node.network_state())
            .map(|raw| raw.to_owned())
    }
}

impl Handler<SendFinality> for Chain {
    type Result = ();

    fn handle(&mut self, msg: SendFinality, _ctx: &mut Self::Context) {
        let SendFinality(fid) = msg;
        if let Some(feed) = self.feeds.get(&fid) {
            self.finality_feeds.insert(fid, feed.clone());
        }
    }
}

impl Handler<NoMoreFinality> for Chain {
    type Result = ();

    fn handle(&mut self, msg: NoMoreFinality, _: &mut Self::Context) {
        let NoMoreFinality(fid) = msg;
        self.finality_feeds.remove(&fid);
    }
}

impl Handler<Unsubscribe> for Chain {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _: &mut Self::Context) {
        let Unsubscribe(fid) = msg;

        if let Some(feed) = self.feeds.get(&fid) {
            self.serializer
                .push(feed::UnsubscribedFrom(self.genesis_hash));

            if let Some(serialized) = self.serializer.finalize() {
                feed.do_send(serialized);
            }
        }

        self.feeds.remove(&fid);
        self.finality_feeds.remove(&fid);
    }
}
