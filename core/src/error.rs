use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The query string was blank after cleaning.
    #[error("empty search query")]
    EmptyQuery,

    /// The locale tag could not be parsed into a word segmenter.
    #[error("unknown locale: {0:?}")]
    UnknownLocale(String),

    /// An underlying store or snapshot I/O failure.
    #[error("store failure: {0}")]
    Store(String),
}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Store(err.to_string())
    }
}

impl From<bincode::Error> for SearchError {
    fn from(err: bincode::Error) -> Self {
        SearchError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Store(err.to_string())
    }
}
