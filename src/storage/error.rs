/// Error type for store operations.
///
/// Reported by store backends; the session layer wraps it in
/// [`Error::Store`](crate::Error::Store) without touching any session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
