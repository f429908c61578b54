use referral_common::error::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("failed to load {path}: {message}")]
    DataLoad { path: String, message: String },

    #[error("insufficient training data: {0}")]
    InsufficientData(String),

    #[error("incompatible model artifact: {0}")]
    IncompatibleArtifact(String),

    #[error("similar-case query out of range: index {index}, count {count}, corpus size {len}")]
    IndexOutOfRange { index: usize, count: usize, len: usize },

    #[error("artifact read failed at {path}: {message}")]
    ArtifactRead { path: String, message: String },

    #[error("artifact write failed at {path}: {message}")]
    ArtifactWrite { path: String, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}
