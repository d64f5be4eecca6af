use thiserror::Error;

/// Contract violations between controller and worker. None of these are
/// recoverable: they mean the two sides disagree on the envelope format.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("worker envelope is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message from worker is empty or doesn't contain a code field: {raw}")]
    MissingCode { raw: String },
    #[error("message from worker contains an unknown message code: {code}")]
    UnknownCode { code: String },
    #[error("malformed payload for {code}: {reason}")]
    MalformedPayload { code: &'static str, reason: String },
    #[error("request must be a bare JSON string, got: {raw}")]
    InvalidRequest { raw: String },
}

impl ProtocolError {
    pub fn malformed(code: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            code,
            reason: reason.into(),
        }
    }
}
