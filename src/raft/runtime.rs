use std::{path::Path, sync::Arc};

use anyhow::Context;
use tracing::info;

use crate::{
    raft::{
        app::RealRaft,
        network_http::HttpNetworkFactory,
        storage::{FileLogStore, WordStateMachine},
        types::{NodeId, TypeConfig},
    },
    tracker::WordTracker,
};

/// Raft timing and compaction knobs, in milliseconds / log entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftTuning {
    pub cluster_name: String,
    pub heartbeat_interval_ms: u64,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub snapshot_logs_since_last: u64,
}

impl Default for RaftTuning {
    fn default() -> Self {
        Self {
            cluster_name: "wordtracker".to_string(),
            heartbeat_interval_ms: 50,
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            snapshot_logs_since_last: 5_000,
        }
    }
}

impl RaftTuning {
    fn to_config(&self) -> anyhow::Result<openraft::Config> {
        openraft::Config {
            cluster_name: self.cluster_name.clone(),
            heartbeat_interval: self.heartbeat_interval_ms,
            election_timeout_min: self.election_timeout_min_ms,
            election_timeout_max: self.election_timeout_max_ms,
            snapshot_policy: openraft::SnapshotPolicy::LogsSinceLast(
                self.snapshot_logs_since_last,
            ),
            ..Default::default()
        }
        .validate()
        .map_err(|e| anyhow::anyhow!("raft config validate: {e}"))
    }
}

/// Open the node's log and state machine under `data_dir` and start raft.
///
/// Initialization is left to the caller because it depends on bootstrap mode.
pub async fn start_raft(
    data_dir: &Path,
    node_id: NodeId,
    tuning: &RaftTuning,
    tracker: Arc<WordTracker>,
    network: HttpNetworkFactory,
) -> anyhow::Result<RealRaft> {
    let config = Arc::new(tuning.to_config()?);

    let log_store = FileLogStore::open(data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("open log store: {e}"))?;
    let state_machine = WordStateMachine::open(data_dir, tracker)
        .await
        .map_err(|e| anyhow::anyhow!("open state machine: {e}"))?;

    let raft =
        openraft::Raft::<TypeConfig>::new(node_id, config, network, log_store, state_machine)
            .await
            .context("start raft")?;

    info!(node_id, data_dir = %data_dir.display(), "raft started");
    Ok(RealRaft::new(raft))
}
