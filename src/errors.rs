//! Error kinds for the proxy, per the four categories in the design: transport,
//! framing, snapshot, and configuration errors. Only `ConfigError` is fatal to
//! the process; everything else is fatal only to the `Session` that hit it.

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("RESP framing error: {0}")]
    Framing(String),

    #[error("snapshot format error: {0}")]
    Snapshot(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn framing(msg: impl Into<String>) -> Self {
        ProxyError::Framing(msg.into())
    }

    pub fn snapshot(msg: impl Into<String>) -> Self {
        ProxyError::Snapshot(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ProxyError::Config(msg.into())
    }

    /// True if this error should only tear down the current session, as
    /// opposed to being fatal to the whole process (only `ConfigError` is).
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, ProxyError::Config(_))
    }
}
