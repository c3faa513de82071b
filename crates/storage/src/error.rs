#![forbid(unsafe_code)]

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    Json(serde_json::Error),
    InvalidInput(&'static str),
    /// Node, parent or snapshot id does not exist.
    UnknownNode,
    /// No snapshot recorded for the requested version.
    UnknownVersion {
        version: i64,
    },
    /// The stored conflict references a version the node has moved past;
    /// the caller must re-read and retry.
    StaleConflict {
        expected: i64,
        actual: i64,
    },
    /// Unknown resolution kind or missing required payload. Rejected before
    /// any mutation.
    InvalidResolution(&'static str),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::UnknownNode => write!(f, "unknown node"),
            Self::UnknownVersion { version } => {
                write!(f, "no snapshot recorded for version {version}")
            }
            Self::StaleConflict { expected, actual } => write!(
                f,
                "conflict is stale (expected v{expected}, node is at v{actual}); re-read and retry"
            ),
            Self::InvalidResolution(message) => write!(f, "invalid resolution: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
