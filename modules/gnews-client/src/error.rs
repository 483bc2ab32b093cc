use thiserror::Error;

pub type Result<T> = std::result::Result<T, GnewsError>;

#[derive(Debug, Error)]
pub enum GnewsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Feed request failed (status {status})")]
    Api { status: u16 },

    #[error("Feed parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GnewsError {
    fn from(err: reqwest::Error) -> Self {
        GnewsError::Network(err.to_string())
    }
}
