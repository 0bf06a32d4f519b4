// Memory fabric error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("{0} image is empty")]
    EmptyImage(&'static str),

    #[error("{what} image of {len:#X} bytes does not fit at {addr:#06X} (store is {capacity:#X} bytes)")]
    ImageTooLarge {
        what: &'static str,
        addr: usize,
        len: usize,
        capacity: usize,
    },

    #[error("GROM base {0} is out of range (0-15)")]
    InvalidGromBase(usize),

    #[error("peripheral ROM number {0} is out of range (1-15)")]
    InvalidPeripheralRom(u8),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

impl MemoryError {
    pub(crate) fn snapshot_len(field: &str, expected: usize, found: usize) -> Self {
        MemoryError::InvalidSnapshot(format!(
            "{} has {:#X} bytes, expected {:#X}",
            field, found, expected
        ))
    }
}
