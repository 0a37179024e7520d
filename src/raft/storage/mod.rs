//! Storage adapters for openraft's storage-v2 traits.
//!
//! - `FileLogStore` implements `openraft::storage::RaftLogStorage` (JSON files under
//!   `<data_dir>/raft/log`).
//! - `WordStateMachine` implements `openraft::storage::RaftStateMachine` on top of the in-memory
//!   word tracker, with snapshots under `<data_dir>/raft/snapshots`.

pub mod file;
pub mod state_machine;

pub use file::{FileLogStore, StorePaths};
pub use state_machine::{WordSnapshotBuilder, WordStateMachine};
