use thiserror::Error;

/// Failure taxonomy shared by every crate in the workspace.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP failure reaching an upstream (feed, weather API, chat platform).
    #[error("transport error: {0}")]
    Transport(String),
    /// Upstream answered but the body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Durable store read or write failure.
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for failures caused by an upstream service rather than by the caller.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Parse(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::Transport("HTTP 503".to_string()).to_string(),
            "transport error: HTTP 503"
        );
        assert_eq!(
            Error::NotFound("ZIP code 00000".to_string()).to_string(),
            "not found: ZIP code 00000"
        );
    }

    #[test]
    fn test_is_upstream() {
        assert!(Error::Transport(String::new()).is_upstream());
        assert!(Error::Parse(String::new()).is_upstream());
        assert!(!Error::NotFound(String::new()).is_upstream());
        assert!(!Error::Persistence(String::new()).is_upstream());
    }
}
