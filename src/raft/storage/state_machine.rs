use std::{io::Cursor, path::Path, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    raft::{
        storage::file::{StorePaths, blocking, io_err, read_bytes},
        types::{ClientRequest, ClientResponse, NodeId, NodeMeta, TypeConfig},
    },
    snapshot::{FileSnapshotSink, MemorySink, SnapshotSink as _},
    tracker::WordTracker,
};

use openraft::entry::RaftPayload as _;
use openraft::{
    EntryPayload, ErrorSubject, ErrorVerb, LogId, Snapshot, SnapshotMeta, StoredMembership,
    storage::RaftStateMachine,
};

#[derive(Debug, Default)]
struct StateMachineInner {
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, NodeMeta>,
}

/// Adapts [`WordTracker`] to openraft's state machine hooks.
///
/// The ranked buffer lives only in memory. Durability comes from snapshots plus the committed
/// tail of the log, which openraft re-applies after [`WordStateMachine::open`] restores the
/// latest snapshot.
#[derive(Debug, Clone)]
pub struct WordStateMachine {
    tracker: Arc<WordTracker>,
    paths: StorePaths,
    inner: Arc<Mutex<StateMachineInner>>,
}

impl WordStateMachine {
    pub async fn open(
        data_dir: &Path,
        tracker: Arc<WordTracker>,
    ) -> Result<Self, openraft::StorageError<NodeId>> {
        let paths = StorePaths::new(data_dir);
        paths
            .ensure_dirs()
            .map_err(|e| io_err(ErrorSubject::Store, ErrorVerb::Write, e))?;

        let mut inner = StateMachineInner::default();
        if let Some((meta, payload)) = load_snapshot_file(&paths).await? {
            restore_tracker(&tracker, &meta, &payload)?;
            info!(snapshot_id = %meta.snapshot_id, "restored word tracker from snapshot");
            inner.last_applied = meta.last_log_id;
            inner.last_membership = meta.last_membership;
        }

        Ok(Self {
            tracker,
            paths,
            inner: Arc::new(Mutex::new(inner)),
        })
    }
}

fn restore_tracker(
    tracker: &WordTracker,
    meta: &SnapshotMeta<NodeId, NodeMeta>,
    bytes: &[u8],
) -> Result<(), openraft::StorageError<NodeId>> {
    let index = meta.last_log_id.map(|l| l.index).unwrap_or(0);
    tracker.restore(index, bytes).map_err(|e| {
        io_err(
            ErrorSubject::Snapshot(Some(meta.signature())),
            ErrorVerb::Read,
            std::io::Error::other(e),
        )
    })
}

/// Write `current_snapshot.dat`: one line of compact meta JSON followed by the encoded words.
///
/// Meta and payload are published by a single rename; a crash leaves either the previous pair
/// or the new one, never new words under an older applied log id.
async fn store_snapshot_file(
    paths: &StorePaths,
    meta: &SnapshotMeta<NodeId, NodeMeta>,
    payload: Vec<u8>,
) -> Result<(), openraft::StorageError<NodeId>> {
    let subject = ErrorSubject::Snapshot(Some(meta.signature()));
    let mut header =
        serde_json::to_vec(meta).map_err(|e| io_err(subject.clone(), ErrorVerb::Write, e.into()))?;
    header.push(b'\n');

    let path = paths.snapshot_file.clone();
    blocking(move || {
        let mut sink = FileSnapshotSink::with_header(&path, &header)?;
        if let Err(err) = sink.write_all(&payload) {
            sink.cancel();
            return Err(err);
        }
        sink.close()
    })
    .await
    .map_err(|e| io_err(subject, ErrorVerb::Write, e))
}

async fn load_snapshot_file(
    paths: &StorePaths,
) -> Result<Option<(SnapshotMeta<NodeId, NodeMeta>, Vec<u8>)>, openraft::StorageError<NodeId>> {
    let read_err = |e| io_err(ErrorSubject::Snapshot(None), ErrorVerb::Read, e);
    let Some(bytes) = read_bytes(&paths.snapshot_file).await.map_err(read_err)? else {
        return Ok(None);
    };
    split_snapshot_file(&bytes).map(Some).map_err(read_err)
}

fn split_snapshot_file(
    bytes: &[u8],
) -> std::io::Result<(SnapshotMeta<NodeId, NodeMeta>, Vec<u8>)> {
    let newline = bytes.iter().position(|b| *b == b'\n').ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "snapshot file has no header")
    })?;
    let meta = serde_json::from_slice(&bytes[..newline])
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok((meta, bytes[newline + 1..].to_vec()))
}

#[derive(Debug)]
pub struct WordSnapshotBuilder {
    tracker: Arc<WordTracker>,
    inner: Arc<Mutex<StateMachineInner>>,
    paths: StorePaths,
}

impl openraft::RaftSnapshotBuilder<TypeConfig> for WordSnapshotBuilder {
    async fn build_snapshot(
        &mut self,
    ) -> Result<Snapshot<TypeConfig>, openraft::StorageError<NodeId>> {
        // Holding `inner` keeps `apply` out while the buffer copy and its log id are taken.
        let (snapshot, last_applied, last_membership) = {
            let inner = self.inner.lock().await;
            (
                self.tracker.snapshot(),
                inner.last_applied,
                inner.last_membership.clone(),
            )
        };

        let meta = SnapshotMeta {
            last_log_id: last_applied,
            last_membership,
            snapshot_id: format!(
                "snapshot-{}",
                last_applied.as_ref().map(|l| l.index).unwrap_or(0)
            ),
        };

        let mut memory = MemorySink::new();
        snapshot.persist(&mut memory).map_err(|e| {
            io_err(
                ErrorSubject::Snapshot(None),
                ErrorVerb::Write,
                std::io::Error::from(e),
            )
        })?;
        let bytes = memory.into_bytes().unwrap_or_default();

        store_snapshot_file(&self.paths, &meta, bytes.clone()).await?;

        info!(
            snapshot_id = %meta.snapshot_id,
            best_words = ?snapshot.words().as_slice(),
            "built snapshot"
        );

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(bytes)),
        })
    }
}

impl RaftStateMachine<TypeConfig> for WordStateMachine {
    type SnapshotBuilder = WordSnapshotBuilder;

    async fn applied_state(
        &mut self,
    ) -> Result<
        (Option<LogId<NodeId>>, StoredMembership<NodeId, NodeMeta>),
        openraft::StorageError<NodeId>,
    > {
        let inner = self.inner.lock().await;
        Ok((inner.last_applied, inner.last_membership.clone()))
    }

    async fn apply<I>(
        &mut self,
        entries: I,
    ) -> Result<Vec<ClientResponse>, openraft::StorageError<NodeId>>
    where
        I: IntoIterator<Item = openraft::impls::Entry<TypeConfig>> + openraft::OptionalSend,
        I::IntoIter: openraft::OptionalSend,
    {
        let mut responses = Vec::new();
        let mut inner = self.inner.lock().await;

        for entry in entries {
            let log_id = entry.log_id;
            if let Some(membership) = entry.get_membership() {
                inner.last_membership = StoredMembership::new(Some(log_id), membership.clone());
            }

            let resp = match entry.payload {
                EntryPayload::Normal(ClientRequest::AddWord { word }) => {
                    let changed = self.tracker.apply(log_id.index, &word);
                    debug!(index = log_id.index, %word, changed, "applied word");
                    ClientResponse::Applied { changed }
                }
                EntryPayload::Membership(_) | EntryPayload::Blank => {
                    self.tracker.advance(log_id.index);
                    ClientResponse::Applied { changed: false }
                }
            };

            inner.last_applied = Some(log_id);
            responses.push(resp);
        }

        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        WordSnapshotBuilder {
            tracker: self.tracker.clone(),
            inner: self.inner.clone(),
            paths: self.paths.clone(),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<
        Box<<TypeConfig as openraft::RaftTypeConfig>::SnapshotData>,
        openraft::StorageError<NodeId>,
    > {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, NodeMeta>,
        mut snapshot: Box<<TypeConfig as openraft::RaftTypeConfig>::SnapshotData>,
    ) -> Result<(), openraft::StorageError<NodeId>> {
        use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};

        snapshot
            .seek(std::io::SeekFrom::Start(0))
            .await
            .map_err(|e| io_err(ErrorSubject::Snapshot(None), ErrorVerb::Read, e))?;
        let mut buf = Vec::new();
        snapshot
            .read_to_end(&mut buf)
            .await
            .map_err(|e| io_err(ErrorSubject::Snapshot(None), ErrorVerb::Read, e))?;

        {
            let mut inner = self.inner.lock().await;
            restore_tracker(&self.tracker, meta, &buf)?;
            inner.last_applied = meta.last_log_id;
            inner.last_membership = meta.last_membership.clone();
        }

        store_snapshot_file(&self.paths, meta, buf).await?;
        info!(snapshot_id = %meta.snapshot_id, "installed snapshot");
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, openraft::StorageError<NodeId>> {
        Ok(load_snapshot_file(&self.paths)
            .await?
            .map(|(meta, payload)| Snapshot {
                meta,
                snapshot: Box::new(Cursor::new(payload)),
            }))
    }
}
