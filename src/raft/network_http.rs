use std::time::Duration;

use anyhow::Context;
use tracing::debug;

use crate::raft::types::{NodeId, NodeMeta, TypeConfig};

use openraft::{
    RaftNetwork, RaftNetworkFactory,
    error::{InstallSnapshotError, RPCError, RaftError, Unreachable},
    network::RPCOption,
    raft::{
        AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest,
        InstallSnapshotResponse, VoteRequest, VoteResponse,
    },
};

/// Creates one [`HttpNetwork`] per peer, sharing a single connection pool.
#[derive(Clone)]
pub struct HttpNetworkFactory {
    client: reqwest::Client,
}

impl HttpNetworkFactory {
    pub fn try_new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .context("build raft http client")?;
        Ok(Self { client })
    }
}

#[derive(Clone)]
pub struct HttpNetwork {
    target: NodeId,
    base: String,
    client: reqwest::Client,
}

type RpcResult<Resp, E = openraft::error::Infallible> =
    Result<Resp, RPCError<NodeId, NodeMeta, RaftError<NodeId, E>>>;

impl HttpNetwork {
    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// POST `req` as JSON; the peer answers with the serialized `Result` of the raft call.
    async fn post_json<Req, Resp, E>(
        &self,
        path: &str,
        req: &Req,
        option: RPCOption,
    ) -> RpcResult<Resp, E>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
        E: std::error::Error + serde::de::DeserializeOwned,
    {
        let res: Result<Resp, RaftError<NodeId, E>> = self
            .client
            .post(self.url(path))
            .timeout(option.hard_ttl())
            .json(req)
            .send()
            .await
            .map_err(|e| {
                debug!(target_node = self.target, path, error = %e, "raft rpc unreachable");
                RPCError::Unreachable(Unreachable::new(&e))
            })?
            .json()
            .await
            .map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;
        res.map_err(|e| RPCError::RemoteError(openraft::error::RemoteError::new(self.target, e)))
    }
}

impl RaftNetworkFactory<TypeConfig> for HttpNetworkFactory {
    type Network = HttpNetwork;

    async fn new_client(&mut self, target: NodeId, node: &NodeMeta) -> Self::Network {
        debug!(target_node = target, endpoint = %node.raft_endpoint, "new raft peer client");
        HttpNetwork {
            target,
            base: node.raft_endpoint.clone(),
            client: self.client.clone(),
        }
    }
}

impl RaftNetwork<TypeConfig> for HttpNetwork {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        option: RPCOption,
    ) -> RpcResult<AppendEntriesResponse<NodeId>> {
        self.post_json("/raft/append", &rpc, option).await
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        option: RPCOption,
    ) -> RpcResult<InstallSnapshotResponse<NodeId>, InstallSnapshotError> {
        self.post_json("/raft/snapshot", &rpc, option).await
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        option: RPCOption,
    ) -> RpcResult<VoteResponse<NodeId>> {
        self.post_json("/raft/vote", &rpc, option).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn url_joins_base_and_path() {
        let mut factory = HttpNetworkFactory::try_new().unwrap();
        let node = NodeMeta {
            name: "node-2".to_string(),
            raft_endpoint: "http://127.0.0.1:21002/".to_string(),
            rpc_addr: "127.0.0.1:50052".to_string(),
        };
        let network = factory.new_client(2, &node).await;
        assert_eq!(network.url("/raft/vote"), "http://127.0.0.1:21002/raft/vote");
    }

    #[tokio::test]
    async fn unreachable_peer_maps_to_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut factory = HttpNetworkFactory::try_new().unwrap();
        let node = NodeMeta {
            raft_endpoint: format!("http://{addr}"),
            ..Default::default()
        };
        let mut network = factory.new_client(3, &node).await;
        let vote = VoteRequest::new(openraft::Vote::new(1, 1), None);
        let err = network
            .vote(vote, RPCOption::new(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, RPCError::Unreachable(_)), "{err:?}");
    }
}
