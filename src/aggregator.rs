use actix::prelude::*;
use actix_web_actors::ws::{CloseCode, CloseReason};
use ctor::ctor;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::chain::{self, Chain, ChainId, Label};
use crate::feed::connector::{Connected, FeedConnector, FeedId};
use crate::feed::{self, FeedMessageSerializer};
use crate::node::connector::{Mute, NodeConnector};
use crate::types::{NodeDetails, NodeId};
use crate::util::{process_salt, DenseMap, Hash, NodeIdRegistry, NodeKey, SWEEP_INTERVAL};

/// Cadence of the stale-node/timeout sweep fanned out to every `Chain`.
const TICK_INTERVAL: Duration = Duration::from_secs(10);

pub struct Aggregator {
    genesis_hashes: HashMap<Hash, ChainId>,
    labels: HashMap<Label, ChainId>,
    chains: DenseMap<ChainEntry>,
    feeds: DenseMap<Addr<FeedConnector>>,
    serializer: FeedMessageSerializer,
    /// Denylist for networks we do not want to allow connecting.
    denylist: HashSet<String>,
    node_ids: NodeIdRegistry,
    process_salt: u64,
}

pub struct ChainEntry {
    /// Address to the `Chain` agent
    addr: Addr<Chain>,
    /// Genesis [`Hash`] of the chain
    genesis_hash: Hash,
    /// String name of the chain
    label: Label,
    /// Node count
    nodes: usize,
    /// Maximum allowed nodes
    max_nodes: usize,
}

#[ctor]
/// Labels of chains we consider "first party". These chains allow any
/// number of nodes to connect.
static FIRST_PARTY_NETWORKS: HashSet<&'static str> = {
    let mut set = HashSet::new();
    set.insert("Polkadot");
    set.insert("Kusama");
    set.insert("Westend");
    set.insert("Rococo");
    set
};

/// Max number of nodes allowed to connect to the telemetry server.
const THIRD_PARTY_NETWORKS_MAX_NODES: usize = 500;

impl Aggregator {
    pub fn new(denylist: HashSet<String>) -> Self {
        Aggregator {
            genesis_hashes: HashMap::new(),
            labels: HashMap::new(),
            chains: DenseMap::new(),
            feeds: DenseMap::new(),
            serializer: FeedMessageSerializer::new(),
            denylist,
            node_ids: NodeIdRegistry::new(),
            process_salt: process_salt(),
        }
    }

    /// Get an address to the chain actor by name. If the address is not found,
    /// or the address is disconnected (actor dropped), create a new one.
    pub fn lazy_chain(
        &mut self,
        genesis_hash: Hash,
        label: &str,
        ctx: &mut <Self as Actor>::Context,
    ) -> ChainId {
        let cid = match self.genesis_hashes.get(&genesis_hash).copied() {
            Some(cid) => cid,
            None => {
                self.serializer
                    .push(feed::AddedChain(&label, genesis_hash, 1));

                let addr = ctx.address();
                let max_nodes = max_nodes(label);
                let label: Label = label.into();
                let cid = self.chains.add_with(|cid| ChainEntry {
                    addr: Chain::new(cid, genesis_hash, addr, label.clone()).start(),
                    genesis_hash,
                    label: label.clone(),
                    nodes: 1,
                    max_nodes,
                });

                self.labels.insert(label, cid);
                self.genesis_hashes.insert(genesis_hash, cid);

                self.broadcast();

                cid
            }
        };

        cid
    }

    fn get_chain(&mut self, genesis_hash: &Hash) -> Option<&mut ChainEntry> {
        let chains = &mut self.chains;
        self.genesis_hashes
            .get(genesis_hash)
            .and_then(move |&cid| chains.get_mut(cid))
    }

    fn broadcast(&mut self) {
        if let Some(msg) = self.serializer.finalize() {
            for (_, feed) in self.feeds.iter() {
                feed.do_send(msg.clone());
            }
        }
    }
}

impl Actor for Aggregator {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.run_interval(TICK_INTERVAL, |act, _ctx| {
            for (_, entry) in act.chains.iter() {
                entry.addr.do_send(chain::Tick);
            }
        });

        ctx.run_interval(SWEEP_INTERVAL, |act, _ctx| {
            act.node_ids.sweep();
        });
    }
}

/// Message sent from the NodeConnector to the Aggregator upon getting all node details
#[derive(Message)]
#[rtype(result = "()")]
pub struct AddNode {
    /// Details of the node being added to the aggregator
    pub node: NodeDetails,
    /// Genesis [`Hash`] of the chain the node is being added to.
    pub genesis_hash: Hash,
    /// Address of the NodeConnector actor
    pub node_connector: Addr<NodeConnector>,
}

/// Message sent from the Chain to the Aggregator when the Chain loses all nodes
#[derive(Message)]
#[rtype(result = "()")]
pub struct DropChain(pub ChainId);

#[derive(Message)]
#[rtype(result = "()")]
pub struct RenameChain(pub ChainId, pub Label);

/// Message sent from the FeedConnector to the Aggregator when subscribing to a new chain
#[derive(Message)]
#[rtype(result = "bool")]
pub struct Subscribe {
    pub genesis_hash: Hash,
    pub feed: Addr<FeedConnector>,
}

/// Message sent from the FeedConnector to the Aggregator consensus requested
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendFinality {
    pub genesis_hash: Hash,
    pub fid: FeedId,
}

/// Message sent from the FeedConnector to the Aggregator no more consensus required
#[derive(Message)]
#[rtype(result = "()")]
pub struct NoMoreFinality {
    pub genesis_hash: Hash,
    pub fid: FeedId,
}

/// Message sent from the FeedConnector to the Aggregator when first connected
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect(pub Addr<FeedConnector>);

/// Message sent from the FeedConnector to the Aggregator when disconnecting
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect(pub FeedId);

/// Message sent from the Chain to the Aggergator when the node count on the chain changes
#[derive(Message)]
#[rtype(result = "()")]
pub struct NodeCount(pub ChainId, pub usize);

/// Message sent to the Aggregator to get a health check
#[derive(Message)]
#[rtype(result = "usize")]
pub struct GetHealth;

/// Sent by the HTTP sidecar to fetch a node's last-reported `network_state`.
#[derive(Message)]
#[rtype(result = "Option<Box<serde_json::value::RawValue>>")]
pub struct GetNetworkState {
    pub label: Box<str>,
    pub nid: NodeId,
}

impl Handler<GetNetworkState> for Aggregator {
    type Result = ResponseFuture<Option<Box<serde_json::value::RawValue>>>;

    fn handle(&mut self, msg: GetNetworkState, _: &mut Self::Context) -> Self::Result {
        let GetNetworkState { label, nid } = msg;

        let chain_addr = self
            .labels
            .get(&*label)
            .and_then(|&cid| self.chains.get(cid))
            .map(|entry| entry.addr.clone());

        Box::pin(async move {
            match chain_addr {
                Some(addr) => addr.send(chain::GetNetworkState(nid)).await.ok().flatten(),
                None => None,
            }
        })
    }
}

impl Handler<AddNode> for Aggregator {
    type Result = ();

    fn handle(&mut self, msg: AddNode, ctx: &mut Self::Context) {
        if self.denylist.contains(&*msg.node.chain) {
            log::warn!(target: "Aggregator::AddNode", "'{}' is on the denylist.", msg.node.chain);
            let AddNode { node_connector, .. } = msg;
            let reason = CloseReason {
                code: CloseCode::Abnormal,
                description: Some("Denied".into()),
            };
            node_connector.do_send(Mute { reason });
            return;
        }
        let AddNode {
            node,
            genesis_hash,
            node_connector,
        } = msg;
        log::trace!(target: "Aggregator::AddNode", "New node connected. Chain '{}'", node.chain);

        let key = match &node.validator {
            Some(authority) => NodeKey::Public(authority.clone()),
            None => NodeKey::NameSalt(node.name.clone(), self.process_salt),
        };
        let nid = self.node_ids.assign(key);

        let cid = self.lazy_chain(genesis_hash, &node.chain, ctx);
        let chain = self
            .chains
            .get_mut(cid)
            .expect("Entry just created above; qed");
        if chain.nodes < chain.max_nodes {
            chain.addr.do_send(chain::AddNode {
                nid,
                node,
                node_connector,
            });
        } else {
            log::warn!(target: "Aggregator::AddNode", "Chain {} is over quota ({})", chain.label, chain.max_nodes);
            let reason = CloseReason {
                code: CloseCode::Again,
                description: Some("Overquota".into()),
            };
            node_connector.do_send(Mute { reason });
        }
    }
}

impl Handler<DropChain> for Aggregator {
    type Result = ();

    fn handle(&mut self, msg: DropChain, _: &mut Self::Context) {
        let DropChain(cid) = msg;

        if let Some(entry) = self.chains.remove(cid) {
            let label = &entry.label;
            self.genesis_hashes.remove(&entry.genesis_hash);
            self.labels.remove(label);
            self.serializer.push(feed::RemovedChain(entry.genesis_hash));
            log::info!("Dropped chain [{}] from the aggregator", label);
            self.broadcast();
        }
    }
}

impl Handler<RenameChain> for Aggregator {
    type Result = ();

    fn handle(&mut self, msg: RenameChain, _: &mut Self::Context) {
        let RenameChain(cid, new) = msg;

        if let Some(entry) = self.chains.get_mut(cid) {
            if entry.label == new {
                return;
            }

            // Update UI
            self.serializer.push(feed::RemovedChain(entry.genesis_hash));
            self.serializer
                .push(feed::AddedChain(&new, entry.genesis_hash, entry.nodes));

            // Update labels -> cid map
            self.labels.remove(&entry.label);
            self.labels.insert(new.clone(), cid);

            // Update entry
            entry.label = new;

            self.broadcast();
        }
    }
}

impl Handler<Subscribe> for Aggregator {
    type Result = bool;

    fn handle(&mut self, msg: Subscribe, _: &mut Self::Context) -> bool {
        let Subscribe { genesis_hash, feed } = msg;

        if let Some(chain) = self.get_chain(&genesis_hash) {
            chain.addr.do_send(chain::Subscribe(feed));
            true
        } else {
            false
        }
    }
}

impl Handler<SendFinality> for Aggregator {
    type Result = ();

    fn handle(&mut self, msg: SendFinality, _: &mut Self::Context) {
        let SendFinality { genesis_hash, fid } = msg;
        if let Some(chain) = self.get_chain(&genesis_hash) {
            chain.addr.do_send(chain::SendFinality(fid));
        }
    }
}

impl Handler<NoMoreFinality> for Aggregator {
    type Result = ();

    fn handle(&mut self, msg: NoMoreFinality, _: &mut Self::Context) {
        let NoMoreFinality { genesis_hash, fid } = msg;
        if let Some(chain) = self.get_chain(&genesis_hash) {
            chain.addr.do_send(chain::NoMoreFinality(fid));
        }
    }
}

impl Handler<Connect> for Aggregator {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Self::Context) {
        let Connect(connector) = msg;

        let fid = self.feeds.add(connector.clone());

        log::info!("Feed #{} connected", fid);

        connector.do_send(Connected(fid));

        self.serializer.push(feed::Version(32));

        // TODO: keep track on number of nodes connected to each chain
        for (_, entry) in self.chains.iter() {
            self.serializer.push(feed::AddedChain(
                &entry.label,
                entry.genesis_hash,
                entry.nodes,
            ));
        }

        if let Some(msg) = self.serializer.finalize() {
            connector.do_send(msg);
        }
    }
}

impl Handler<Disconnect> for Aggregator {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Self::Context) {
        let Disconnect(fid) = msg;

        log::info!("Feed #{} disconnected", fid);

        self.feeds.remove(fid);
    }
}

impl Handler<NodeCount> for Aggregator {
    type Result = ();

    fn handle(&mut self, msg: NodeCount, _: &mut Self::Context) {
        let NodeCount(cid, count) = msg;

        if let Some(entry) = self.chains.get_mut(cid) {
            entry.nodes = count;

            self.serializer
                .push(feed::AddedChain(&entry.label, entry.genesis_hash, count));
            self.broadcast();
        }
    }
}

impl Handler<GetHealth> for Aggregator {
    type Result = usize;

    fn handle(&mut self, _: GetHealth, _: &mut Self::Context) -> Self::Result {
        self.chains.len()
    }
}

/// First party networks (Polkadot, Kusama etc) are allowed any number of nodes.
/// Third party networks are allowed `THIRD_PARTY_NETWORKS_MAX_NODES` nodes and
/// no more.
fn max_nodes(label: &str) -> usize {
    if FIRST_PARTY_NETWORKS.contains(label) {
        usize::MAX
    } else {
        THIRD_PARTY_NETWORKS_MAX_NODES
    }
}
