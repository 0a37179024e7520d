use std::{collections::BTreeMap, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::raft::{NodeId, NodeMeta, runtime::RaftTuning};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "wordtracker",
    about = "Replicated top-3 longest word tracker",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a replica: raft peer endpoints plus the gRPC service (default).
    Run,

    /// Submit a word to a replica and print its commit index.
    AddWord(AddWordArgs),

    /// Print a replica's current best words and the index they were read at.
    GetWords,
}

#[derive(Args, Debug, Clone)]
pub struct AddWordArgs {
    #[arg(value_name = "WORD")]
    pub word: String,
}

/// A cluster member given on the command line as `ID=RAFT_ADDR[@RPC_ADDR]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: NodeId,
    pub raft_endpoint: String,
    pub rpc_addr: String,
}

impl FromStr for Peer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("expected ID=RAFT_ADDR[@RPC_ADDR], got {s:?}"))?;
        let id = id
            .trim()
            .parse::<NodeId>()
            .map_err(|e| format!("invalid peer id {id:?}: {e}"))?;
        let (raft, rpc) = match rest.split_once('@') {
            Some((raft, rpc)) => (raft, rpc),
            None => (rest, ""),
        };
        if raft.is_empty() {
            return Err(format!("missing raft address for peer {id}"));
        }
        Ok(Self {
            id,
            raft_endpoint: endpoint_url(raft),
            rpc_addr: rpc.to_string(),
        })
    }
}

fn endpoint_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "WORDTRACKER_NODE_ID",
        value_name = "ID",
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub node_id: NodeId,

    #[arg(
        long,
        global = true,
        env = "WORDTRACKER_RAFT_BIND",
        value_name = "ADDR",
        default_value = "127.0.0.1:21001"
    )]
    pub raft_bind: SocketAddr,

    /// URL peers use to reach this node's raft endpoints (defaults to `http://<raft-bind>`).
    #[arg(long, global = true, env = "WORDTRACKER_RAFT_URL", value_name = "URL")]
    pub raft_url: Option<String>,

    #[arg(
        long,
        global = true,
        env = "WORDTRACKER_RPC_BIND",
        value_name = "ADDR",
        default_value = "127.0.0.1:50051"
    )]
    pub rpc_bind: SocketAddr,

    #[arg(
        long,
        global = true,
        env = "WORDTRACKER_DATA_DIR",
        value_name = "PATH",
        default_value = "./data"
    )]
    pub data_dir: PathBuf,

    /// Other voters, as `ID=RAFT_ADDR[@RPC_ADDR]`. Only used when bootstrapping.
    #[arg(
        long = "peer",
        global = true,
        env = "WORDTRACKER_PEERS",
        value_name = "PEER",
        value_delimiter = ','
    )]
    pub peers: Vec<Peer>,

    /// Initialize the cluster with this node and `--peer`s as voters if it is not yet
    /// initialized.
    #[arg(
        long,
        global = true,
        env = "WORDTRACKER_BOOTSTRAP",
        value_name = "BOOL",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub bootstrap: bool,

    #[arg(
        long,
        global = true,
        env = "WORDTRACKER_CLUSTER_NAME",
        value_name = "NAME",
        default_value = "wordtracker"
    )]
    pub cluster_name: String,

    #[arg(
        long = "write-timeout-ms",
        global = true,
        env = "WORDTRACKER_WRITE_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 1_000,
        value_parser = clap::value_parser!(u64).range(1..=60_000)
    )]
    pub write_timeout_ms: u64,

    #[arg(
        long = "heartbeat-interval-ms",
        global = true,
        env = "WORDTRACKER_HEARTBEAT_INTERVAL_MS",
        value_name = "MS",
        default_value_t = 50,
        value_parser = clap::value_parser!(u64).range(10..=10_000)
    )]
    pub heartbeat_interval_ms: u64,

    #[arg(
        long = "election-timeout-min-ms",
        global = true,
        env = "WORDTRACKER_ELECTION_TIMEOUT_MIN_MS",
        value_name = "MS",
        default_value_t = 150,
        value_parser = clap::value_parser!(u64).range(20..=60_000)
    )]
    pub election_timeout_min_ms: u64,

    #[arg(
        long = "election-timeout-max-ms",
        global = true,
        env = "WORDTRACKER_ELECTION_TIMEOUT_MAX_MS",
        value_name = "MS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(20..=60_000)
    )]
    pub election_timeout_max_ms: u64,

    #[arg(
        long = "snapshot-logs-since-last",
        global = true,
        env = "WORDTRACKER_SNAPSHOT_LOGS_SINCE_LAST",
        value_name = "N",
        default_value_t = 5_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub snapshot_logs_since_last: u64,

    /// Replica address used by `add-word` and `get-words`.
    #[arg(
        long,
        global = true,
        env = "WORDTRACKER_SERVER",
        value_name = "ADDR",
        default_value = "127.0.0.1:50051"
    )]
    pub server: String,
}

impl Config {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn raft_tuning(&self) -> RaftTuning {
        RaftTuning {
            cluster_name: self.cluster_name.clone(),
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            election_timeout_min_ms: self.election_timeout_min_ms,
            election_timeout_max_ms: self.election_timeout_max_ms,
            snapshot_logs_since_last: self.snapshot_logs_since_last,
        }
    }

    pub fn node_meta(&self) -> NodeMeta {
        NodeMeta {
            name: format!("node-{}", self.node_id),
            raft_endpoint: self
                .raft_url
                .clone()
                .unwrap_or_else(|| endpoint_url(&self.raft_bind.to_string())),
            rpc_addr: self.rpc_bind.to_string(),
        }
    }

    /// This node plus every `--peer`, keyed by node id.
    pub fn members(&self) -> BTreeMap<NodeId, NodeMeta> {
        let mut members: BTreeMap<NodeId, NodeMeta> = self
            .peers
            .iter()
            .map(|peer| {
                let meta = NodeMeta {
                    name: format!("node-{}", peer.id),
                    raft_endpoint: peer.raft_endpoint.clone(),
                    rpc_addr: peer.rpc_addr.clone(),
                };
                (peer.id, meta)
            })
            .collect();
        members.insert(self.node_id, self.node_meta());
        members
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_apply_when_flags_absent() {
        let cli = Cli::try_parse_from(["wordtracker"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config.node_id, 1);
        assert_eq!(cli.config.rpc_bind.to_string(), "127.0.0.1:50051");
        assert_eq!(cli.config.raft_bind.to_string(), "127.0.0.1:21001");
        assert_eq!(cli.config.write_timeout(), Duration::from_secs(1));
        assert!(!cli.config.bootstrap);
        assert!(cli.config.peers.is_empty());
        assert_eq!(cli.config.raft_tuning(), RaftTuning::default());
    }

    #[test]
    fn parses_peers_and_builds_members() {
        let cli = Cli::try_parse_from([
            "wordtracker",
            "--node-id",
            "1",
            "--raft-bind",
            "127.0.0.1:21001",
            "--peer",
            "2=127.0.0.1:21002@127.0.0.1:50052",
            "--peer",
            "3=http://10.0.0.3:21003",
            "--bootstrap",
            "true",
        ])
        .unwrap();

        assert!(cli.config.bootstrap);
        let members = cli.config.members();
        assert_eq!(members.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(members[&1].raft_endpoint, "http://127.0.0.1:21001");
        assert_eq!(members[&2].raft_endpoint, "http://127.0.0.1:21002");
        assert_eq!(members[&2].rpc_addr, "127.0.0.1:50052");
        assert_eq!(members[&3].raft_endpoint, "http://10.0.0.3:21003");
        assert_eq!(members[&3].rpc_addr, "");
    }

    #[test]
    fn parses_client_subcommands() {
        let cli =
            Cli::try_parse_from(["wordtracker", "add-word", "hello", "--server", "10.0.0.1:1"])
                .unwrap();
        match cli.command {
            Some(Command::AddWord(args)) => assert_eq!(args.word, "hello"),
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.config.server, "10.0.0.1:1");

        let cli = Cli::try_parse_from(["wordtracker", "get-words"]).unwrap();
        assert!(matches!(cli.command, Some(Command::GetWords)));
    }

    #[test]
    fn rejects_invalid_write_timeout() {
        let err = Cli::try_parse_from(["wordtracker", "--write-timeout-ms", "0"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--write-timeout-ms"));
        assert!(msg.contains("1..=60000"));
    }

    #[test]
    fn rejects_malformed_peer() {
        let err = Cli::try_parse_from(["wordtracker", "--peer", "nope"]).unwrap_err();
        assert!(err.to_string().contains("ID=RAFT_ADDR"));

        let err = Cli::try_parse_from(["wordtracker", "--peer", "x=127.0.0.1:1"]).unwrap_err();
        assert!(err.to_string().contains("invalid peer id"));
    }

    #[test]
    fn raft_url_overrides_advertised_endpoint() {
        let cli = Cli::try_parse_from([
            "wordtracker",
            "--raft-url",
            "http://node-1.internal:21001",
        ])
        .unwrap();
        assert_eq!(
            cli.config.node_meta().raft_endpoint,
            "http://node-1.internal:21001"
        );
    }
}
