use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed chapter id {0:?}: expected \"<title-id>-<ordinal>\"")]
    MalformedChapterId(String),

    #[error("invalid title id {0:?}: {1}")]
    InvalidTitleId(String, &'static str),

    #[error("fetcher produced no usable directory for title {0:?}")]
    FetchFailed(String),

    #[error("no page images found for title {0:?}")]
    NoPages(String),

    #[error("catalog failure: {0}")]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
