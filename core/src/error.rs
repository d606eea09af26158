use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel is not connected")]
    NotConnected,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<tungstenite::Error> for WatchError {
    fn from(err: tungstenite::Error) -> Self {
        WatchError::Transport(err.to_string())
    }
}

pub type WatchResult<T> = Result<T, WatchError>;
