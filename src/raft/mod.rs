//! Consensus glue: openraft type config, storage adapters, HTTP transport and bootstrap.
//!
//! The rest of the crate only talks to the log through [`app::RaftFacade`].

pub mod app;
pub mod http_rpc;
pub mod network_http;
pub mod runtime;
pub mod storage;
pub mod types;

pub use app::{Committed, LocalRaft, RaftFacade, RealRaft, WriteError};
pub use types::{ClientRequest, ClientResponse, NodeId, NodeMeta, TypeConfig};
