use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Tag of a worker -> controller status update, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageCode {
    PreparingModel,
    ModelProgress,
    ModelReady,
    GeneratingResponse,
    ResponseReady,
    ModelError,
    InferenceError,
}

impl MessageCode {
    pub const ALL: [MessageCode; 7] = [
        MessageCode::PreparingModel,
        MessageCode::ModelProgress,
        MessageCode::ModelReady,
        MessageCode::GeneratingResponse,
        MessageCode::ResponseReady,
        MessageCode::ModelError,
        MessageCode::InferenceError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreparingModel => "PREPARING_MODEL",
            Self::ModelProgress => "MODEL_PROGRESS",
            Self::ModelReady => "MODEL_READY",
            Self::GeneratingResponse => "GENERATING_RESPONSE",
            Self::ResponseReady => "RESPONSE_READY",
            Self::ModelError => "MODEL_ERROR",
            Self::InferenceError => "INFERENCE_ERROR",
        }
    }

    pub fn from_wire(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }

    /// Terminal codes conclude a preparation phase or one inference run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ModelReady | Self::ResponseReady | Self::ModelError | Self::InferenceError
        )
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Worker -> controller envelope: `{ "code": ..., "payload"?: ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    PreparingModel,
    ModelProgress(u8),
    ModelReady,
    GeneratingResponse,
    ResponseReady(String),
    ModelError,
    InferenceError,
}

impl WorkerMessage {
    pub fn code(&self) -> MessageCode {
        match self {
            Self::PreparingModel => MessageCode::PreparingModel,
            Self::ModelProgress(_) => MessageCode::ModelProgress,
            Self::ModelReady => MessageCode::ModelReady,
            Self::GeneratingResponse => MessageCode::GeneratingResponse,
            Self::ResponseReady(_) => MessageCode::ResponseReady,
            Self::ModelError => MessageCode::ModelError,
            Self::InferenceError => MessageCode::InferenceError,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.code().is_terminal()
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Strict decoding: a missing, empty or unknown code is an error, and so
    /// is a payload that does not fit its code. Payloads on codes that carry
    /// none are ignored.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(ProtocolError::MissingCode {
                    raw: other.to_string(),
                })
            }
        };

        let code = match fields.get("code") {
            Some(Value::String(code)) if !code.is_empty() => Ok(code.as_str()),
            None | Some(Value::Null) | Some(Value::String(_)) => Err(None),
            Some(other) => Err(Some(other.to_string())),
        };
        let code = match code {
            Ok(code) => MessageCode::from_wire(code).ok_or_else(|| ProtocolError::UnknownCode {
                code: code.to_string(),
            })?,
            Err(Some(code)) => return Err(ProtocolError::UnknownCode { code }),
            Err(None) => {
                return Err(ProtocolError::MissingCode {
                    raw: Value::Object(fields).to_string(),
                })
            }
        };

        let payload = fields.remove("payload");
        let message = match code {
            MessageCode::PreparingModel => Self::PreparingModel,
            MessageCode::ModelProgress => Self::ModelProgress(parse_percent(payload)?),
            MessageCode::ModelReady => Self::ModelReady,
            MessageCode::GeneratingResponse => Self::GeneratingResponse,
            MessageCode::ResponseReady => match payload {
                Some(Value::String(text)) => Self::ResponseReady(text),
                other => {
                    return Err(ProtocolError::malformed(
                        code.as_str(),
                        format!("expected generated text, got {}", describe(other.as_ref())),
                    ))
                }
            },
            MessageCode::ModelError => Self::ModelError,
            MessageCode::InferenceError => Self::InferenceError,
        };
        Ok(message)
    }
}

fn parse_percent(payload: Option<Value>) -> Result<u8, ProtocolError> {
    let code = MessageCode::ModelProgress.as_str();
    let number = payload.as_ref().and_then(|value| {
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|v| v.fract() == 0.0 && *v >= 0.0)
                .map(|v| v as u64)
        })
    });
    let Some(number) = number else {
        return Err(ProtocolError::malformed(
            code,
            format!("expected integer percent, got {}", describe(payload.as_ref())),
        ));
    };
    if number > 100 {
        return Err(ProtocolError::malformed(
            code,
            format!("percent {number} is out of range 0..=100"),
        ));
    }
    Ok(number as u8)
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "nothing".to_string(),
        Some(value) => value.to_string(),
    }
}

/// Controller -> worker request: the prompt as a bare JSON string.
pub fn encode_request(prompt: &str) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(prompt)?)
}

pub fn decode_request(raw: &str) -> Result<String, ProtocolError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::String(prompt) => Ok(prompt),
        other => Err(ProtocolError::InvalidRequest {
            raw: other.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
