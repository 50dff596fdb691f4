use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error")]
    Io(#[from] io::Error),
    #[error("bad magic number, not a store file")]
    BadMagic,
    #[error("unsupported store version {0}")]
    UnsupportedVersion(u16),
    #[error("block {0} checksum mismatch, data is corrupt")]
    Checksum(u64),
    #[error("block id {0} out of range")]
    BlockOutOfRange(u64),
    #[error("row {0} not found")]
    RowNotFound(u32),
    #[error("block {0} has no room for a row of {1} bytes")]
    BlockFull(u64, u32),
    #[error("store is full, no free data block available")]
    StoreFull,
    #[error("failed to acquire block lock")]
    Lock(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
