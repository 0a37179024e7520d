pub mod client;
pub mod config;
pub mod grpc;
pub mod proto;
pub mod raft;
pub mod snapshot;
pub mod tracker;
pub mod version;
pub mod words;
