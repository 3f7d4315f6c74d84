use thiserror::Error;

#[derive(Error, Debug)]
pub enum SenriError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Playlist fetch error")]
    PlaylistFetchError,

    #[error("Invalid m3u8 file: {0}")]
    InvalidManifest(String),

    #[error("Playlist contains no directives")]
    EmptyPlaylist,

    #[error("No representation found in playlist")]
    NoRepresentation,

    #[error("Operation interrupted")]
    Interrupted,

    #[error("Blocking playlist reload timed out")]
    ReloadTimeout,

    #[error("Delta playlist can not be merged, {missing} skipped segments are unknown")]
    SkipMergeFailed { missing: u64 },

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    ConfigError(#[from] toml::de::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

pub type SenriResult<T> = Result<T, SenriError>;
