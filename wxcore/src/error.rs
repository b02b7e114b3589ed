use thiserror::Error;

/// Outcome of decoding a backend response that did not yield a value.
///
/// The backend reports most failures inside the body (script assignments,
/// XML tags or a `BaseResponse.Ret` field) instead of through HTTP status,
/// so callers get either the backend's own code or a shape mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("backend returned code {code}")]
    Backend { code: i64 },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl DecodeError {
    pub fn malformed(what: impl Into<String>) -> Self {
        DecodeError::Malformed(what.into())
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, DecodeError::Backend { .. })
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}
