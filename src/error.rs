use thiserror::Error;

use crate::consts::TRANSIENT_RETCODES;

/// Everything that can go wrong talking to the bridge, the broker or Ollama.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bridge request timed out after {0} s")]
    Timeout(u64),

    #[error("bridge error: {0}")]
    Bridge(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("order rejected by broker: retcode {code} ({comment})")]
    Rejected { code: u32, comment: String },

    #[error("no live tick for {0}")]
    NoTick(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("no open position with ticket {0}")]
    PositionNotFound(u64),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing environment variable {0}")]
    Env(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Failures the trade retry wrapper is allowed to re-attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Io(_) | Error::Timeout(_) => true,
            Error::Rejected { code, .. } => TRANSIENT_RETCODES.contains(code),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
