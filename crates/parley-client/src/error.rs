use parley_engine::EngineError;
use parley_shared::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("No conversation is open")]
    NoActiveConversation,

    #[error("Reconciler is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, ClientError>;
