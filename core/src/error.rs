use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeelError {
    #[error("Not a valid volume: {0}")]
    BadVolume(String),

    #[error("Not found")]
    NotFound,

    #[error("Corrupt MFT record: {0}")]
    CorruptRecord(String),

    #[error("Buffer is not a multi-sector record")]
    NotARecord,

    #[error("Update sequence mismatch in sector {sector}")]
    UsaMismatch { sector: usize },

    #[error("Corrupt runlist: {0}")]
    CorruptRunlist(String),

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeelError {
    /// `NotFound` is the only expected failure of a lookup; everything
    /// else indicates a damaged volume or a failing device.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeelError::NotFound)
    }
}
