
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraftError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Context channel closed: {0}")]
    Channel(String),
}

pub type Result<T> = std::result::Result<T, GraftError>;

// Helper conversions
impl From<rusqlite::Error> for GraftError {
    fn from(e: rusqlite::Error) -> Self { Self::Store(e.to_string()) }
}
