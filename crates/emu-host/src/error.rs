use emu_core::InitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no content is loaded")]
    NotLoaded,

    #[error("failed to read content: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("invalid host configuration: {0}")]
    Config(String),
}
