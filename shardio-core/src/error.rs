use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShardError>;

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid node address: {0:?}")]
    InvalidAddress(String),

    #[error("Node already registered: {0}")]
    AlreadyRegistered(String),

    #[error("No storage nodes registered")]
    NoNodes,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Fragment not found: {filename}#{index}")]
    FragmentNotFound { filename: String, index: u32 },

    #[error("Fragment already exists: {filename}#{index}")]
    FragmentExists { filename: String, index: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShardError {
    /// Coarse class used when mapping onto RPC status codes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShardError::InvalidInput(_) | ShardError::InvalidAddress(_) => ErrorKind::InvalidInput,
            ShardError::NoNodes
            | ShardError::FileNotFound(_)
            | ShardError::FragmentNotFound { .. } => ErrorKind::NotFound,
            ShardError::AlreadyRegistered(_)
            | ShardError::FileExists(_)
            | ShardError::FragmentExists { .. } => ErrorKind::AlreadyExists,
            ShardError::Transport(_) => ErrorKind::Transport,
            ShardError::Io(_)
            | ShardError::Serialization(_)
            | ShardError::Config(_)
            | ShardError::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    AlreadyExists,
    Transport,
    Internal,
}

impl From<reqwest::Error> for ShardError {
    fn from(err: reqwest::Error) -> Self {
        ShardError::Transport(err.to_string())
    }
}
