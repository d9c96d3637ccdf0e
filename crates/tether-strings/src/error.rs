use tether_wire::WireError;

/// Errors that can occur while resolving string-table references.
#[derive(Debug, thiserror::Error)]
pub enum StringTableError {
    /// The stream faulted while reading an entry.
    #[error(transparent)]
    Stream(#[from] WireError),

    /// The remote side referenced a dictionary slot it never defined.
    #[error("remote referenced undefined string slot {0}")]
    UndefinedSlot(u32),
}
