/// Error types shared across the referral engine crates.
///
/// These errors represent failures in the domain-independent text and vector
/// machinery. Application-specific errors are defined in the engine crate and
/// wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("vectorizer error: {0}")]
    Vectorizer(String),

    #[error("vector index error: {0}")]
    Index(String),
}
