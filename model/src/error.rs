use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid label name: {0:?}")]
    InvalidLabelName(String),
    #[error("invalid fingerprint: {0:?}")]
    InvalidFingerprint(String),
}
