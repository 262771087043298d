use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Network-level failure talking to the node; retried up to the
    /// client's budget before surfacing.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// Error object returned by the node.
    #[error("rpc {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("malformed response: {0}")]
    Format(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
