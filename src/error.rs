use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("capacity {size} is not a positive multiple of the page size ({page_size} bytes)")]
    InvalidSize { size: usize, page_size: usize },

    #[error("memory mapping failed while {step}: {source}")]
    MappingFailed { step: &'static str, source: Errno },

    #[error("memory unmapping failed: {0}")]
    UnmapFailed(Errno),

    #[error("insufficient space in ring buffer")]
    InsufficientSpace,

    #[error("insufficient buffered data")]
    InsufficientData,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("descriptor transfer failed: {0}")]
    Io(#[from] Errno),
}

impl Error {
    /// True when a descriptor transfer failed only because the descriptor
    /// was not ready (`EAGAIN`, which is `EWOULDBLOCK` on Linux).
    pub fn is_would_block(&self) -> bool {
        matches!(self, Error::Io(Errno::EAGAIN))
    }
}
