use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("channel `{channel}` is not open")]
    NotOpen { channel: String },
    #[error("queue full")]
    QueueFull,
    #[error("failed to spawn delivery thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("parse error: {0}")]
    Parse(String),
}

#[cfg(feature = "config")]
impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Parse(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
