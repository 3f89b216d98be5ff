use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouteError>;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Invalid upstream address: {0}")]
    InvalidAddress(String),

    #[error("Caddy admin API returned {status}: {body}")]
    RouteUpsert { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for RouteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RouteError::Protocol(err.to_string())
        } else {
            RouteError::Transport(err.to_string())
        }
    }
}
