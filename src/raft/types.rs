use std::io::Cursor;

use serde::{Deserialize, Serialize};

pub type NodeId = u64;

/// Raft node metadata stored in the membership config and used by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    /// A human-friendly node name.
    pub name: String,

    /// Base URL of the node's raft HTTP endpoints, e.g. `http://10.0.0.2:21001`.
    pub raft_endpoint: String,

    /// Address of the node's client-facing gRPC listener. Informational; lets clients find the
    /// leader after a failed write.
    pub rpc_addr: String,
}

/// State-machine command submitted to Raft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientRequest {
    AddWord { word: String },
}

/// State-machine response to a committed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientResponse {
    /// `changed` reports whether the ranked buffer was modified.
    Applied { changed: bool },
}

openraft::declare_raft_types!(
    /// Raft type configuration: word commands over `NodeMeta` members, snapshots held in memory.
    pub TypeConfig:
        D = ClientRequest,
        R = ClientResponse,
        NodeId = NodeId,
        Node = NodeMeta,
        // Needs tokio `io-util` for the AsyncRead/AsyncSeek impls on Cursor.
        SnapshotData = Cursor<Vec<u8>>,
);
