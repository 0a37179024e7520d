use tonic::transport::{Channel, Endpoint};

use crate::proto::wordtracker::{
    AddWordRequest, GetWordsRequest, GetWordsResponse, word_tracker_client::WordTrackerClient,
};

#[derive(Debug)]
pub enum ClientError {
    Transport(tonic::transport::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "wordtracker transport error: {err}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
        }
    }
}

impl From<tonic::transport::Error> for ClientError {
    fn from(value: tonic::transport::Error) -> Self {
        Self::Transport(value)
    }
}

/// Thin wrapper over the generated client for one replica.
#[derive(Debug, Clone)]
pub struct TrackerClient {
    inner: WordTrackerClient<Channel>,
}

/// Connect to `server`, given as `host:port` or a full `http://` URL.
pub async fn connect(server: &str) -> Result<TrackerClient, ClientError> {
    let uri = if server.contains("://") {
        server.to_string()
    } else {
        format!("http://{server}")
    };
    let channel = Endpoint::from_shared(uri)?.connect().await?;
    Ok(TrackerClient {
        inner: WordTrackerClient::new(channel),
    })
}

impl TrackerClient {
    /// Returns the commit index of the word.
    pub async fn add_word(&mut self, word: impl Into<String>) -> Result<u64, tonic::Status> {
        let resp = self
            .inner
            .add_word(AddWordRequest { word: word.into() })
            .await?;
        Ok(resp.into_inner().commit_index)
    }

    pub async fn get_words(&mut self) -> Result<GetWordsResponse, tonic::Status> {
        let resp = self.inner.get_words(GetWordsRequest {}).await?;
        Ok(resp.into_inner())
    }
}
