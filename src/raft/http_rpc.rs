//! Peer-to-peer raft endpoints. Each handler hands the request to the local raft instance and
//! returns its `Result` verbatim as JSON; `HttpNetwork` decodes it on the other side.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::raft::types::{NodeId, NodeMeta, TypeConfig};

use openraft::{
    RaftMetrics,
    error::{InstallSnapshotError, RaftError},
    raft::{
        AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest,
        InstallSnapshotResponse, VoteRequest, VoteResponse,
    },
};

#[derive(Clone)]
pub struct RaftRpcState {
    pub raft: openraft::Raft<TypeConfig>,
}

pub fn build_raft_rpc_router(state: RaftRpcState) -> Router {
    Router::new()
        .route("/raft/append", post(append_entries))
        .route("/raft/vote", post(vote))
        .route("/raft/snapshot", post(install_snapshot))
        .route("/raft/metrics", get(metrics))
        .with_state(state)
}

async fn append_entries(
    State(state): State<RaftRpcState>,
    Json(req): Json<AppendEntriesRequest<TypeConfig>>,
) -> Json<Result<AppendEntriesResponse<NodeId>, RaftError<NodeId>>> {
    Json(state.raft.append_entries(req).await)
}

async fn vote(
    State(state): State<RaftRpcState>,
    Json(req): Json<VoteRequest<NodeId>>,
) -> Json<Result<VoteResponse<NodeId>, RaftError<NodeId>>> {
    Json(state.raft.vote(req).await)
}

async fn install_snapshot(
    State(state): State<RaftRpcState>,
    Json(req): Json<InstallSnapshotRequest<TypeConfig>>,
) -> Json<Result<InstallSnapshotResponse<NodeId>, RaftError<NodeId, InstallSnapshotError>>> {
    Json(state.raft.install_snapshot(req).await)
}

async fn metrics(State(state): State<RaftRpcState>) -> Json<RaftMetrics<NodeId, NodeMeta>> {
    Json(state.raft.metrics().borrow().clone())
}
