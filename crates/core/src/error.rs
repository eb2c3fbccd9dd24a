use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),
}
