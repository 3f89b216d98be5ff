use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid address template '{0}': expected exactly one %d or %x placeholder")]
    InvalidTemplate(String),

    #[error("Invalid user entry: {0}")]
    InvalidUser(String),

    #[error("Duplicate user entry: {0}")]
    DuplicateUser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Parse(err.to_string())
    }
}

impl From<serde_yaml_ng::Error> for CoreError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        CoreError::Parse(err.to_string())
    }
}
