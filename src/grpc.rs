//! Client-facing gRPC service.
//!
//! `AddWord` goes through the consensus log and answers with the commit index. `GetWords` is
//! served from this replica's tracker without consulting the leader, so it may lag the cluster;
//! `read_at_index` tells the caller how far the answer is caught up.

use std::{sync::Arc, time::Duration};

use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use crate::{
    proto::wordtracker::{
        AddWordRequest, AddWordResponse, GetWordsRequest, GetWordsResponse,
        word_tracker_server::{WordTracker as WordTrackerRpc, WordTrackerServer},
    },
    raft::{ClientRequest, RaftFacade},
    tracker::WordTracker,
    words::SEPARATOR,
};

/// Default deadline for a write to commit.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct WordTrackerService {
    tracker: Arc<WordTracker>,
    raft: Arc<dyn RaftFacade>,
    write_timeout: Duration,
}

impl WordTrackerService {
    pub fn new(
        tracker: Arc<WordTracker>,
        raft: Arc<dyn RaftFacade>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            tracker,
            raft,
            write_timeout,
        }
    }

    pub fn into_server(self) -> WordTrackerServer<Self> {
        WordTrackerServer::new(self)
    }
}

#[tonic::async_trait]
impl WordTrackerRpc for WordTrackerService {
    async fn add_word(
        &self,
        request: Request<AddWordRequest>,
    ) -> Result<Response<AddWordResponse>, Status> {
        let word = request.into_inner().word;
        if word.contains(SEPARATOR) {
            return Err(Status::invalid_argument("word must not contain a newline"));
        }

        let req = ClientRequest::AddWord { word: word.clone() };
        match self.raft.client_write(req, self.write_timeout).await {
            Ok(committed) => {
                debug!(%word, commit_index = committed.index, "word committed");
                Ok(Response::new(AddWordResponse {
                    commit_index: committed.index,
                }))
            }
            Err(err) => {
                warn!(
                    %word,
                    error = %err,
                    applied_index = self.raft.applied_index(),
                    "cannot add word"
                );
                Err(Status::unavailable("cannot add word"))
            }
        }
    }

    async fn get_words(
        &self,
        _request: Request<GetWordsRequest>,
    ) -> Result<Response<GetWordsResponse>, Status> {
        let view = self
            .tracker
            .read()
            .map_err(|e| Status::failed_precondition(e.to_string()))?;
        Ok(Response::new(GetWordsResponse {
            best_words: view.best_words.to_vec(),
            read_at_index: view.read_at_index,
        }))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tonic::Code;

    use super::*;
    use crate::raft::{Committed, LocalRaft, WriteError, app::BoxFuture};

    struct FailingRaft;

    impl RaftFacade for FailingRaft {
        fn client_write(
            &self,
            _req: ClientRequest,
            timeout: Duration,
        ) -> BoxFuture<'_, Result<Committed, WriteError>> {
            Box::pin(async move { Err(WriteError::Timeout(timeout)) })
        }

        fn applied_index(&self) -> u64 {
            0
        }
    }

    fn local_service() -> (Arc<WordTracker>, WordTrackerService) {
        let tracker = Arc::new(WordTracker::new());
        let raft = Arc::new(LocalRaft::new(tracker.clone()));
        let service = WordTrackerService::new(tracker.clone(), raft, DEFAULT_WRITE_TIMEOUT);
        (tracker, service)
    }

    async fn add(service: &WordTrackerService, word: &str) -> Result<u64, Status> {
        let resp = service
            .add_word(Request::new(AddWordRequest {
                word: word.to_string(),
            }))
            .await?;
        Ok(resp.into_inner().commit_index)
    }

    async fn get(service: &WordTrackerService) -> Result<GetWordsResponse, Status> {
        Ok(service
            .get_words(Request::new(GetWordsRequest {}))
            .await?
            .into_inner())
    }

    #[tokio::test]
    async fn write_then_read_sees_the_word() {
        let (_tracker, service) = local_service();

        let commit_index = add(&service, "hello").await.unwrap();
        assert_eq!(commit_index, 1);

        let resp = get(&service).await.unwrap();
        assert!(resp.read_at_index >= commit_index);
        assert_eq!(resp.best_words, vec!["hello", "", ""]);
    }

    #[tokio::test]
    async fn read_returns_ranked_words_and_index() {
        let (_tracker, service) = local_service();
        for word in ["cat", "dog", "elephant", "ox", "zebra"] {
            add(&service, word).await.unwrap();
        }

        let resp = get(&service).await.unwrap();
        assert_eq!(resp.read_at_index, 5);
        assert_eq!(resp.best_words, vec!["elephant", "zebra", "cat"]);
    }

    #[tokio::test]
    async fn commit_failure_is_a_generic_unavailable() {
        let tracker = Arc::new(WordTracker::new());
        let service =
            WordTrackerService::new(tracker, Arc::new(FailingRaft), Duration::from_millis(10));

        let status = add(&service, "hello").await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), "cannot add word");
    }

    #[tokio::test]
    async fn newline_words_are_rejected_before_the_log() {
        let (tracker, service) = local_service();

        let status = add(&service, "two\nwords").await.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(tracker.applied_index(), 0);
    }

    #[tokio::test]
    async fn reads_fail_after_a_bad_restore() {
        let (tracker, service) = local_service();
        add(&service, "hello").await.unwrap();

        tracker.restore(3, b"short").unwrap_err();
        let status = get(&service).await.unwrap_err();
        assert_eq!(status.code(), Code::FailedPrecondition);

        tracker.restore(3, b"hello\n\n").unwrap();
        assert_eq!(get(&service).await.unwrap().read_at_index, 3);
    }
}
