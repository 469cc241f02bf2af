use thiserror::Error;

/// Canonical result for the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds the tracker distinguishes.
///
/// Every layer maps into this one taxonomy: the store's restore path must
/// hand a single recoverable error across the region boundary so the init
/// catcher can discard partial state and rebuild, and splitting the kinds
/// per crate would only obscure that contract.
#[derive(Debug, Error)]
pub enum Error {
    /// An in-memory or deserialized value violates a structural invariant:
    /// a non-canonical empty `RStats`, an entry with a null key or dangling
    /// text handle, or a checkpoint that fails magic/version/CRC validation.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// The fingerprint store is full. Never propagated out of upsert;
    /// surfaced as a silent "rejected" outcome instead.
    #[error("fingerprint store is full")]
    Capacity,

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed external input: an unparseable text-form `RStats` or an
    /// unknown field name.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Caller violated an operation's contract (zero fingerprint into
    /// upsert, non-positive total time into the walker). Aborts the current
    /// operation only.
    #[error("precondition violated: {0}")]
    Precondition(String),
}
