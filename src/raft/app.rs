use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use crate::{
    raft::types::{ClientRequest, ClientResponse, NodeId, NodeMeta, TypeConfig},
    tracker::WordTracker,
};

use openraft::error::{ClientWriteError, RaftError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the request layer needs from the consensus log.
///
/// `client_write` resolves once the command is committed and applied locally, or fails; the
/// returned index is the log position the command committed at. `applied_index` is the last log
/// index this replica has applied.
pub trait RaftFacade: Send + Sync + 'static {
    fn client_write(
        &self,
        req: ClientRequest,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Committed, WriteError>>;

    fn applied_index(&self) -> u64;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub index: u64,
    pub response: ClientResponse,
}

#[derive(Debug)]
pub enum WriteError {
    /// No commit within the deadline. The command may still commit later.
    Timeout(Duration),
    /// This node is not the leader.
    ForwardToLeader {
        leader_id: Option<NodeId>,
        leader_rpc_addr: Option<String>,
    },
    Raft(Box<RaftError<NodeId, ClientWriteError<NodeId, NodeMeta>>>),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(timeout) => write!(f, "not committed within {timeout:?}"),
            Self::ForwardToLeader {
                leader_id,
                leader_rpc_addr,
            } => write!(
                f,
                "not the leader (leader_id={leader_id:?}, leader_rpc_addr={leader_rpc_addr:?})"
            ),
            Self::Raft(e) => write!(f, "raft client_write: {e}"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Raft(e) => Some(e.as_ref()),
            Self::Timeout(_) | Self::ForwardToLeader { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct RealRaft {
    raft: openraft::Raft<TypeConfig>,
    metrics: watch::Receiver<openraft::RaftMetrics<NodeId, NodeMeta>>,
}

impl RealRaft {
    pub fn new(raft: openraft::Raft<TypeConfig>) -> Self {
        let metrics = raft.metrics();
        Self { raft, metrics }
    }

    pub fn raft(&self) -> openraft::Raft<TypeConfig> {
        self.raft.clone()
    }

    pub fn metrics(&self) -> watch::Receiver<openraft::RaftMetrics<NodeId, NodeMeta>> {
        self.metrics.clone()
    }

    /// Initialize the cluster with a fixed voter set unless it already has a membership.
    pub async fn initialize_if_needed(
        &self,
        members: BTreeMap<NodeId, NodeMeta>,
    ) -> anyhow::Result<()> {
        let initialized = self
            .raft
            .is_initialized()
            .await
            .context("raft is_initialized")?;
        if initialized {
            return Ok(());
        }
        info!(members = ?members.keys().collect::<Vec<_>>(), "initializing raft cluster");
        self.raft
            .initialize(members)
            .await
            .map_err(|e| anyhow::anyhow!("raft initialize: {e}"))?;
        Ok(())
    }
}

impl RaftFacade for RealRaft {
    fn client_write(
        &self,
        req: ClientRequest,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Committed, WriteError>> {
        Box::pin(async move {
            let resp = match tokio::time::timeout(timeout, self.raft.client_write(req)).await {
                Ok(res) => res,
                Err(_elapsed) => return Err(WriteError::Timeout(timeout)),
            };
            match resp {
                Ok(resp) => Ok(Committed {
                    index: resp.log_id.index,
                    response: resp.data,
                }),
                Err(err) => {
                    if let Some(ClientWriteError::ForwardToLeader(forward)) = err.api_error() {
                        return Err(WriteError::ForwardToLeader {
                            leader_id: forward.leader_id,
                            leader_rpc_addr: forward
                                .leader_node
                                .as_ref()
                                .map(|node| node.rpc_addr.clone()),
                        });
                    }
                    Err(WriteError::Raft(Box::new(err)))
                }
            }
        })
    }

    fn applied_index(&self) -> u64 {
        self.metrics
            .borrow()
            .last_applied
            .map(|log_id| log_id.index)
            .unwrap_or(0)
    }
}

/// A single-process stand-in for the consensus log: every write commits immediately, in call
/// order, and is applied straight to the tracker.
pub struct LocalRaft {
    tracker: Arc<WordTracker>,
    last_index: Mutex<u64>,
}

impl LocalRaft {
    pub fn new(tracker: Arc<WordTracker>) -> Self {
        let last_index = Mutex::new(tracker.applied_index());
        Self {
            tracker,
            last_index,
        }
    }

    fn commit(&self, req: ClientRequest) -> Committed {
        let mut last_index = self.last_index.lock().unwrap_or_else(PoisonError::into_inner);
        *last_index += 1;
        let changed = match req {
            ClientRequest::AddWord { word } => self.tracker.apply(*last_index, &word),
        };
        Committed {
            index: *last_index,
            response: ClientResponse::Applied { changed },
        }
    }
}

impl RaftFacade for LocalRaft {
    fn client_write(
        &self,
        req: ClientRequest,
        _timeout: Duration,
    ) -> BoxFuture<'_, Result<Committed, WriteError>> {
        let committed = self.commit(req);
        Box::pin(async move { Ok(committed) })
    }

    fn applied_index(&self) -> u64 {
        self.tracker.applied_index()
    }
}
