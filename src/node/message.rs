use actix::prelude::*;
use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::types::{Block, BlockHash, BlockNumber, NodeDetails};
use crate::util::Hash;

#[derive(Deserialize, Debug, Message)]
#[rtype(result = "()")]
pub struct NodeMessage {
    #[serde(flatten)]
    pub payload: Payload,
}

impl From<NodeMessage> for Payload {
    fn from(msg: NodeMessage) -> Payload {
        msg.payload
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag = "msg")]
pub enum Payload {
    #[serde(rename = "system.connected")]
    SystemConnected(SystemConnected),
    #[serde(rename = "system.interval")]
    SystemInterval(SystemInterval),
    #[serde(rename = "system.network_state")]
    SystemNetworkState(SystemNetworkState),
    #[serde(rename = "block.import")]
    BlockImport(Block),
    #[serde(rename = "node.start")]
    NodeStart(Block),
    #[serde(rename = "notify.finalized")]
    NotifyFinalized(Finalized),
    #[serde(rename = "txpool.import")]
    TxPoolImport(IgnoredAny),
    #[serde(rename = "afg.finalized")]
    AfgFinalized(AfgFinalized),
    #[serde(rename = "afg.received_precommit")]
    AfgReceivedPrecommit(AfgReceivedPrecommit),
    #[serde(rename = "afg.received_prevote")]
    AfgReceivedPrevote(AfgReceivedPrevote),
    #[serde(rename = "afg.received_commit")]
    AfgReceivedCommit(AfgReceivedCommit),
    #[serde(rename = "afg.authority_set")]
    AfgAuthoritySet(AfgAuthoritySet),
    #[serde(rename = "afg.finalized_blocks_up_to")]
    AfgFinalizedBlocksUpTo(IgnoredAny),
    #[serde(rename = "aura.pre_sealed_block")]
    AuraPreSealedBlock(IgnoredAny),
    #[serde(rename = "prepared_block_for_proposing")]
    PreparedBlockForProposing(IgnoredAny),
}

#[derive(Deserialize, Debug)]
pub struct SystemConnected {
    #[serde(rename = "chain")]
    pub genesis_hash: Hash,
    #[serde(flatten)]
    pub node: NodeDetails,
}

#[derive(Deserialize, Debug)]
pub struct SystemInterval {
    pub peers: Option<u64>,
    pub txcount: Option<u64>,
    pub cpu: Option<f32>,
    pub memory: Option<f32>,
    pub bandwidth_upload: Option<f64>,
    pub bandwidth_download: Option<f64>,
    pub finalized_height: Option<BlockNumber>,
    pub finalized_hash: Option<BlockHash>,
    #[serde(flatten)]
    pub block: Option<Block>,
    pub used_state_cache_size: Option<f32>,
}

#[derive(Deserialize, Debug)]
pub struct SystemNetworkState {
    pub state: Box<serde_json::value::RawValue>,
}

#[derive(Deserialize, Debug)]
pub struct Finalized {
    #[serde(rename = "best")]
    pub hash: BlockHash,
    pub height: Box<str>,
}

#[derive(Deserialize, Debug)]
pub struct AfgAuthoritySet {
    pub authority_id: Box<str>,
    pub authorities: Box<str>,
    pub authority_set_id: Box<str>,
    pub number: Box<str>,
    pub hash: BlockHash,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AfgFinalized {
    pub finalized_hash: BlockHash,
    pub finalized_number: Box<str>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AfgReceived {
    pub target_hash: BlockHash,
    pub target_number: Box<str>,
    pub voter: Option<Box<str>>,
}

impl AfgReceived {
    /// The node's JSON payload quotes the voter address inside the string
    /// value itself (e.g. `"\"5Gr...\""); strip that outer layer.
    pub fn voter(&self) -> Option<Box<str>> {
        self.voter
            .as_deref()
            .map(|v| v.trim_matches('"').into())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AfgReceivedPrecommit {
    #[serde(flatten)]
    pub received: AfgReceived,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AfgReceivedPrevote {
    #[serde(flatten)]
    pub received: AfgReceived,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AfgReceivedCommit {
    #[serde(flatten)]
    pub received: AfgReceived,
}

impl Payload {
    pub fn best_block(&self) -> Option<&Block> {
        match self {
            Payload::BlockImport(block) | Payload::NodeStart(block) => Some(block),
            Payload::SystemInterval(SystemInterval { block, .. }) => block.as_ref(),
            _ => None,
        }
    }

    pub fn finalized_block(&self) -> Option<Block> {
        match self {
            Payload::SystemInterval(ref interval) => Some(Block {
                hash: interval.finalized_hash?,
                height: interval.finalized_height?,
            }),
            Payload::NotifyFinalized(ref finalized) => Some(Block {
                hash: finalized.hash,
                height: finalized.height.parse().ok()?,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_v1_notify_finalized() {
        let json = r#"{"msg":"notify.finalized","level":"INFO","ts":"2021-01-13T12:38:25.410794650+01:00","best":"0x031c3521ca2f9c673812d692fc330b9a18e18a2781e3f9976992f861fd3ea0cb","height":"50"}"#;
        let msg: NodeMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg.payload, Payload::NotifyFinalized(_)));
    }

    #[test]
    fn system_connected_carries_genesis_hash_and_details() {
        let json = r#"{"msg":"system.connected","ts":"2021-01-13T12:22:20.053527101+01:00","chain":"0x0000000000000000000000000000000000000000000000000000000000000000","name":"validator-01","implementation":"Substrate Node","version":"3.0.0","config":""}"#;
        let msg: NodeMessage = serde_json::from_str(json).unwrap();
        match msg.payload {
            Payload::SystemConnected(connected) => {
                assert_eq!(&*connected.node.name, "validator-01");
            }
            _ => panic!("expected SystemConnected"),
        }
    }

    #[test]
    fn afg_received_prevote_strips_quoted_voter() {
        let received = AfgReceived {
            target_hash: BlockHash::from([0; 32]),
            target_number: "10".into(),
            voter: Some("\"5Gr...\"".into()),
        };

        assert_eq!(received.voter().unwrap().as_ref(), "5Gr...");
    }
}
