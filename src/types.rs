use arrayvec::ArrayString;
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

use crate::util::{Hash, MeanList, NodeId as RegistryNodeId};

pub type BlockNumber = u64;
pub type Timestamp = u64;
pub use primitive_types::H256 as BlockHash;
pub type NetworkId = ArrayString<64>;

/// Stable identity assigned by the [`crate::util::NodeIdRegistry`]; the id
/// that is actually broadcast to feeds.
pub type NodeId = RegistryNodeId;

/// GRANDPA voter address, stripped of surrounding quotes on ingest.
pub type Address = Box<str>;

/// Concise block details: number + hash, ordered by number.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Block {
    #[serde(rename = "best")]
    pub hash: BlockHash,
    pub height: BlockNumber,
}

impl Block {
    pub fn zero() -> Self {
        Block {
            hash: BlockHash::from([0; 32]),
            height: 0,
        }
    }
}

/// Static details reported once, in `system.connected`.
#[derive(Deserialize, Debug, Clone)]
pub struct NodeDetails {
    pub chain: Box<str>,
    pub name: Box<str>,
    pub implementation: Box<str>,
    pub version: Box<str>,
    #[serde(alias = "authority")]
    pub validator: Option<Box<str>>,
    #[serde(default)]
    pub network_id: Option<NetworkId>,
    pub startup_time: Option<Box<str>>,
    pub target_os: Option<Box<str>>,
    pub target_arch: Option<Box<str>>,
    pub target_env: Option<Box<str>>,
    #[serde(default)]
    pub sysinfo: Option<NodeSysInfo>,
    #[serde(skip)]
    pub ip: Option<Box<str>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NodeSysInfo {
    pub cpu: Option<Box<str>>,
    pub memory: Option<u64>,
    pub core_count: Option<u32>,
    pub linux_kernel: Option<Box<str>>,
    pub linux_distro: Option<Box<str>>,
    pub is_virtual_machine: Option<bool>,
}

/// A couple of node statistics, sent together since they change together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStats {
    pub peers: u64,
    pub txcount: u64,
}

impl Serialize for NodeStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.peers)?;
        tup.serialize_element(&self.txcount)?;
        tup.end()
    }
}

/// Node IO details (state cache size over time).
#[derive(Default)]
pub struct NodeIO {
    pub used_state_cache_size: MeanList<f32>,
}

impl Serialize for NodeIO {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = serializer.serialize_tuple(1)?;
        tup.serialize_element(self.used_state_cache_size.slice())?;
        tup.end()
    }
}

/// Node hardware details over time (upload/download bandwidth, cpu, memory,
/// and the wall-clock timestamps those decimated samples correspond to).
#[derive(Default)]
pub struct NodeHardware {
    pub cpu: MeanList<f32>,
    pub memory: MeanList<f32>,
    pub upload: MeanList<f32>,
    pub download: MeanList<f32>,
    pub chart_stamps: MeanList<f64>,
}

impl Serialize for NodeHardware {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = serializer.serialize_tuple(3)?;
        tup.serialize_element(self.upload.slice())?;
        tup.serialize_element(self.download.slice())?;
        tup.serialize_element(self.chart_stamps.slice())?;
        tup.end()
    }
}

/// Resolved location for a node's IP.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLocation {
    pub latitude: f32,
    pub longitude: f32,
    pub city: Box<str>,
}

impl Serialize for NodeLocation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = serializer.serialize_tuple(3)?;
        tup.serialize_element(&self.latitude)?;
        tup.serialize_element(&self.longitude)?;
        tup.serialize_element(&&*self.city)?;
        tup.end()
    }
}

/// Verbose block details as broadcast in `ImportedBlock`/`AddedNode`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockDetails {
    pub block: Block,
    pub block_time: u64,
    pub block_timestamp: Timestamp,
    pub propagation_time: Option<u64>,
}

impl Default for BlockDetails {
    fn default() -> Self {
        BlockDetails {
            block: Block::zero(),
            block_timestamp: crate::util::now(),
            block_time: 0,
            propagation_time: None,
        }
    }
}

impl Serialize for BlockDetails {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = serializer.serialize_tuple(5)?;
        tup.serialize_element(&self.block.height)?;
        tup.serialize_element(&self.block.hash)?;
        tup.serialize_element(&self.block_time)?;
        tup.serialize_element(&self.block_timestamp)?;
        tup.serialize_element(&self.propagation_time)?;
        tup.end()
    }
}

/// Opaque `system.network_state` blob, passed through untouched until an
/// HTTP sidecar request asks for it.
pub type NetworkStateBlob = Box<serde_json::value::RawValue>;

/// Entry in a chain's genesis-hash table, re-exported here so `aggregator`
/// and `chain` agree on the `Hash` alias without importing `util` twice.
pub type GenesisHash = Hash;
