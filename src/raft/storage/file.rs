use std::{
    collections::BTreeMap,
    fmt::Debug,
    ops::RangeBounds,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::Mutex;
use tracing::debug;

use crate::raft::types::{NodeId, TypeConfig};

use openraft::{
    ErrorSubject, ErrorVerb, LogId, LogState, RaftLogReader, Vote, storage::RaftLogStorage,
};

/// On-disk layout under `<data_dir>/raft`.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub log_json: PathBuf,
    pub hard_state_json: PathBuf,
    /// Snapshot meta and payload in one file, see `state_machine`.
    pub snapshot_file: PathBuf,
}

impl StorePaths {
    pub fn new(data_dir: &Path) -> Self {
        let log_dir = data_dir.join("raft").join("log");
        let snapshot_dir = data_dir.join("raft").join("snapshots");
        Self {
            log_json: log_dir.join("entries.json"),
            hard_state_json: log_dir.join("hard_state.json"),
            snapshot_file: snapshot_dir.join("current_snapshot.dat"),
        }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for path in [&self.log_json, &self.snapshot_file] {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

type Entry = openraft::impls::Entry<TypeConfig>;

/// Vote and commit point, written together.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
struct HardState {
    #[serde(default)]
    vote: Option<Vote<NodeId>>,
    #[serde(default)]
    committed: Option<LogId<NodeId>>,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct LogFile {
    #[serde(default)]
    last_purged: Option<LogId<NodeId>>,
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Default)]
struct StoredLog {
    last_purged: Option<LogId<NodeId>>,
    entries: BTreeMap<u64, Entry>,
    hard: HardState,
}

impl StoredLog {
    fn last_log_id(&self) -> Option<LogId<NodeId>> {
        match self.entries.last_key_value() {
            Some((_, ent)) => Some(ent.log_id),
            None => self.last_purged,
        }
    }

    fn snapshot_file(&self) -> LogFile {
        LogFile {
            last_purged: self.last_purged,
            entries: self.entries.values().cloned().collect(),
        }
    }
}

/// Raft log held in memory and rewritten as one JSON file whenever it changes.
///
/// Entries are single words and the log is compacted by snapshots, so the file stays small.
#[derive(Debug, Clone)]
pub struct FileLogStore {
    paths: StorePaths,
    state: Arc<Mutex<StoredLog>>,
}

impl FileLogStore {
    pub async fn open(data_dir: &Path) -> Result<Self, openraft::StorageError<NodeId>> {
        let paths = StorePaths::new(data_dir);
        paths
            .ensure_dirs()
            .map_err(|e| io_err(ErrorSubject::Store, ErrorVerb::Write, e))?;

        let file = read_json::<LogFile>(&paths.log_json)
            .await
            .map_err(|e| io_err(ErrorSubject::Logs, ErrorVerb::Read, e))?
            .unwrap_or_default();
        let hard = read_json::<HardState>(&paths.hard_state_json)
            .await
            .map_err(|e| io_err(ErrorSubject::Vote, ErrorVerb::Read, e))?
            .unwrap_or_default();

        let state = StoredLog {
            last_purged: file.last_purged,
            entries: file
                .entries
                .into_iter()
                .map(|ent| (ent.log_id.index, ent))
                .collect(),
            hard,
        };
        debug!(
            entries = state.entries.len(),
            last_log_id = ?state.last_log_id(),
            committed = ?state.hard.committed,
            "opened raft log"
        );

        Ok(Self {
            paths,
            state: Arc::new(Mutex::new(state)),
        })
    }

    async fn flush_entries(&self) -> Result<(), openraft::StorageError<NodeId>> {
        let file = self.state.lock().await.snapshot_file();
        write_json(&self.paths.log_json, &file)
            .await
            .map_err(|e| io_err(ErrorSubject::Logs, ErrorVerb::Write, e))
    }

    async fn update_hard_state(
        &self,
        update: impl FnOnce(&mut HardState),
    ) -> Result<(), openraft::StorageError<NodeId>> {
        let hard = {
            let mut state = self.state.lock().await;
            update(&mut state.hard);
            state.hard
        };
        write_json(&self.paths.hard_state_json, &hard)
            .await
            .map_err(|e| io_err(ErrorSubject::Vote, ErrorVerb::Write, e))
    }
}

impl RaftLogReader<TypeConfig> for FileLogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + openraft::OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry>, openraft::StorageError<NodeId>> {
        let state = self.state.lock().await;
        Ok(state.entries.range(range).map(|(_, ent)| ent.clone()).collect())
    }
}

impl RaftLogStorage<TypeConfig> for FileLogStore {
    type LogReader = FileLogStore;

    async fn get_log_state(
        &mut self,
    ) -> Result<LogState<TypeConfig>, openraft::StorageError<NodeId>> {
        let state = self.state.lock().await;
        Ok(LogState {
            last_purged_log_id: state.last_purged,
            last_log_id: state.last_log_id(),
        })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    async fn save_vote(
        &mut self,
        vote: &Vote<NodeId>,
    ) -> Result<(), openraft::StorageError<NodeId>> {
        let vote = *vote;
        self.update_hard_state(|hard| hard.vote = Some(vote)).await
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, openraft::StorageError<NodeId>> {
        Ok(self.state.lock().await.hard.vote)
    }

    async fn save_committed(
        &mut self,
        committed: Option<LogId<NodeId>>,
    ) -> Result<(), openraft::StorageError<NodeId>> {
        self.update_hard_state(|hard| hard.committed = committed)
            .await
    }

    async fn read_committed(
        &mut self,
    ) -> Result<Option<LogId<NodeId>>, openraft::StorageError<NodeId>> {
        Ok(self.state.lock().await.hard.committed)
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: openraft::storage::LogFlushed<TypeConfig>,
    ) -> Result<(), openraft::StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry> + openraft::OptionalSend,
        I::IntoIter: openraft::OptionalSend,
    {
        self.state
            .lock()
            .await
            .entries
            .extend(entries.into_iter().map(|ent| (ent.log_id.index, ent)));

        let flushed = self.flush_entries().await;
        let io_result = match &flushed {
            Ok(()) => Ok(()),
            Err(e) => Err(std::io::Error::other(e.to_string())),
        };
        callback.log_io_completed(io_result);
        flushed
    }

    async fn truncate(
        &mut self,
        log_id: LogId<NodeId>,
    ) -> Result<(), openraft::StorageError<NodeId>> {
        debug!(%log_id, "truncating log tail");
        self.state.lock().await.entries.split_off(&log_id.index);
        self.flush_entries().await
    }

    async fn purge(&mut self, log_id: LogId<NodeId>) -> Result<(), openraft::StorageError<NodeId>> {
        debug!(%log_id, "purging log head");
        {
            let mut state = self.state.lock().await;
            state.entries.retain(|index, _| *index > log_id.index);
            state.last_purged = Some(log_id);
        }
        self.flush_entries().await
    }
}

pub(crate) fn io_err(
    subject: ErrorSubject<NodeId>,
    verb: ErrorVerb,
    err: std::io::Error,
) -> openraft::StorageError<NodeId> {
    openraft::StorageError::from_io_error(subject, verb, err)
}

pub(crate) async fn blocking<T, F>(f: F) -> Result<T, std::io::Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, std::io::Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(std::io::Error::other)?
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned + Send + 'static>(
    path: &Path,
) -> Result<Option<T>, std::io::Error> {
    let path = path.to_path_buf();
    blocking(move || {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let v = serde_json::from_slice(&bytes).map_err(std::io::Error::other)?;
        Ok(Some(v))
    })
    .await
}

pub(crate) async fn write_json<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), std::io::Error> {
    let bytes = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
    write_bytes(path, bytes).await
}

/// `None` if `path` does not exist.
pub(crate) async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, std::io::Error> {
    let path = path.to_path_buf();
    blocking(move || match std::fs::read(&path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    })
    .await
}

async fn write_bytes(path: &Path, bytes: Vec<u8>) -> Result<(), std::io::Error> {
    let path = path.to_path_buf();
    blocking(move || {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(tmp, path)?;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use openraft::{CommittedLeaderId, EntryPayload};

    use super::*;
    use crate::raft::types::ClientRequest;

    fn entry(index: u64) -> Entry {
        Entry {
            log_id: LogId::new(CommittedLeaderId::new(1, 1), index),
            payload: EntryPayload::Normal(ClientRequest::AddWord {
                word: format!("word-{index}"),
            }),
        }
    }

    async fn append(store: &FileLogStore, entries: Vec<Entry>) {
        store
            .state
            .lock()
            .await
            .entries
            .extend(entries.into_iter().map(|ent| (ent.log_id.index, ent)));
        store.flush_entries().await.unwrap();
    }

    #[tokio::test]
    async fn log_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FileLogStore::open(tmp.path()).await.unwrap();
        append(&store, (1..=3).map(entry).collect()).await;

        let vote = Vote::new(2, 1);
        store.save_vote(&vote).await.unwrap();
        let committed = LogId::new(CommittedLeaderId::new(1, 1), 2);
        store.save_committed(Some(committed)).await.unwrap();

        let mut reopened = FileLogStore::open(tmp.path()).await.unwrap();
        let state = reopened.get_log_state().await.unwrap();
        assert_eq!(state.last_log_id.map(|l| l.index), Some(3));
        assert_eq!(state.last_purged_log_id, None);
        assert_eq!(reopened.read_vote().await.unwrap(), Some(vote));
        assert_eq!(reopened.read_committed().await.unwrap(), Some(committed));

        let entries = reopened.try_get_log_entries(2..).await.unwrap();
        let indexes: Vec<u64> = entries.iter().map(|e| e.log_id.index).collect();
        assert_eq!(indexes, vec![2, 3]);
    }

    #[tokio::test]
    async fn truncate_drops_tail_and_purge_drops_head() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FileLogStore::open(tmp.path()).await.unwrap();
        append(&store, (1..=5).map(entry).collect()).await;

        store.truncate(entry(4).log_id).await.unwrap();
        store.purge(entry(2).log_id).await.unwrap();

        let entries = store.try_get_log_entries(..).await.unwrap();
        let indexes: Vec<u64> = entries.iter().map(|e| e.log_id.index).collect();
        assert_eq!(indexes, vec![3]);

        let mut reopened = FileLogStore::open(tmp.path()).await.unwrap();
        let state = reopened.get_log_state().await.unwrap();
        assert_eq!(state.last_purged_log_id, Some(entry(2).log_id));
        assert_eq!(state.last_log_id, Some(entry(3).log_id));
    }

    #[tokio::test]
    async fn purge_everything_keeps_last_log_id() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FileLogStore::open(tmp.path()).await.unwrap();
        append(&store, (1..=2).map(entry).collect()).await;

        store.purge(entry(2).log_id).await.unwrap();

        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_log_id, Some(entry(2).log_id));
        assert!(store.try_get_log_entries(..).await.unwrap().is_empty());
    }
}
