use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed command: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no server with this id {0}")]
    Lookup(String),

    #[error("value of '{0}' is not JSON serializable")]
    Serialization(String),

    #[error("{0}")]
    Evaluation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AdminError {
    /// Whether the failure stays inside one command and must never reach the transport.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            AdminError::Decode(_)
                | AdminError::Lookup(_)
                | AdminError::Serialization(_)
                | AdminError::Evaluation(_)
        )
    }

    /// Get the kind/category of this error.
    pub fn kind(&self) -> AdminErrorKind {
        match self {
            AdminError::Io(_) => AdminErrorKind::Io,
            AdminError::Decode(_) => AdminErrorKind::Decode,
            AdminError::Lookup(_) => AdminErrorKind::Lookup,
            AdminError::Serialization(_) => AdminErrorKind::Serialization,
            AdminError::Evaluation(_) => AdminErrorKind::Evaluation,
            AdminError::Config(_) => AdminErrorKind::Config,
            AdminError::Other(_) => AdminErrorKind::Other,
        }
    }
}

/// Lightweight error category for pattern matching without borrowing the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminErrorKind {
    Io,
    Decode,
    Lookup,
    Serialization,
    Evaluation,
    Config,
    Other,
}

impl AdminErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdminErrorKind::Io => "IO",
            AdminErrorKind::Decode => "DECODE",
            AdminErrorKind::Lookup => "LOOKUP",
            AdminErrorKind::Serialization => "SERIALIZATION",
            AdminErrorKind::Evaluation => "EVALUATION",
            AdminErrorKind::Config => "CONFIG",
            AdminErrorKind::Other => "OTHER",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_is_contained() {
        let err: AdminError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), AdminErrorKind::Decode);
        assert!(err.is_contained());
        assert!(err.to_string().starts_with("malformed command"));
    }

    #[test]
    fn config_error_is_not_contained() {
        let err = AdminError::Config("server.id is empty".into());
        assert!(!err.is_contained());
        assert_eq!(err.kind().as_str(), "CONFIG");
    }

    #[test]
    fn lookup_error_message() {
        let err = AdminError::Lookup("connector-1".into());
        assert_eq!(err.to_string(), "no server with this id connector-1");
    }
}
