use thiserror::Error;

pub type Result<T> = std::result::Result<T, HeadlessError>;

#[derive(Debug, Error)]
pub enum HeadlessError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("Navigation to {url} timed out")]
    NavigationTimeout { url: String },
}

impl From<chromiumoxide::error::CdpError> for HeadlessError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        HeadlessError::Cdp(err.to_string())
    }
}
