use thiserror::Error;

/// Fatal configuration problems, raised before any metric or request exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("address '{label}' references unknown chain '{chain}'. Available chains: {known:?}")]
    UnknownChain {
        label: String,
        chain: String,
        known: Vec<String>,
    },

    #[error("chain '{0}' is defined more than once")]
    DuplicateChain(String),

    #[error("{0} environment variable is required")]
    MissingVariable(&'static str),

    #[error("invalid value in {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Classification of a failed balance request, used as the `error_type` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Decode,
    RpcError,
    MissingResult,
    Unexpected,
}

impl ErrorKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "request_failed",
            ErrorKind::Decode => "json_decode",
            ErrorKind::RpcError => "rpc_error",
            ErrorKind::MissingResult => "no_result",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

/// A single `eth_getBalance` attempt that did not yield a balance.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("no result in response")]
    MissingResult,

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Transport(_) => ErrorKind::Transport,
            RequestError::Decode(_) => ErrorKind::Decode,
            RequestError::Rpc(_) => ErrorKind::RpcError,
            RequestError::MissingResult => ErrorKind::MissingResult,
            RequestError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}
