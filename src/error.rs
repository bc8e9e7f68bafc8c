use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeedtestError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("No reachable server: all {attempts} latency probes to '{server}' failed")]
    NoReachableServer { server: String, attempts: usize },

    #[error("Transfer failed: every {direction} window against '{server}' failed")]
    TransferFailed { direction: String, server: String },

    #[error("Server not found: '{0}'. Use --list to see available servers")]
    ServerNotFound(String),

    #[error("No servers available to test against")]
    NoServersAvailable,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Descriptor parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, SpeedtestError>;
