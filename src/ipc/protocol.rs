//! Wire shapes of requests, commands and responses

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::CoreError;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("line is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// One decoded input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// answered with exactly one response carrying the same `request_id`
    Request(Request),
    /// fire-and-forget, never answered
    Command(Command),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    /// echoed back verbatim, whatever JSON type the host used
    #[serde(default)]
    pub request_id: Value,
    #[serde(default)]
    pub action: Value,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Name the action is routed by; a non-string action keeps its JSON text.
    pub fn action_name(&self) -> String {
        match &self.action {
            Value::String(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

/// A command carries its arguments at the top level, next to `command`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub body: Value,
}

/// Decodes a raw input line, rejecting bytes that are not UTF-8.
pub fn parse_bytes(line: &[u8]) -> Result<Incoming, ProtocolError> {
    parse_line(std::str::from_utf8(line)?)
}

pub fn parse_line(line: &str) -> Result<Incoming, ProtocolError> {
    let value: Value = serde_json::from_str(line)?;
    let Value::Object(object) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    if !object.contains_key("request_id") {
        if let Some(name) = object.get("command").and_then(Value::as_str) {
            return Ok(Incoming::Command(Command {
                name: name.to_string(),
                body: Value::Object(object),
            }));
        }
    }

    Ok(Incoming::Request(serde_json::from_value(Value::Object(
        object,
    ))?))
}

/// Decodes action parameters; absent params read as an empty object.
pub fn decode_params<T: DeserializeOwned>(params: Value) -> Result<T, CoreError> {
    let params = match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| CoreError::InvalidRequest(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { data: Value },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub request_id: Value,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn success(request_id: Value, data: Value) -> Self {
        Self {
            request_id,
            outcome: Outcome::Success { data },
        }
    }

    pub fn error(request_id: Value, error: impl Into<String>) -> Self {
        Self {
            request_id,
            outcome: Outcome::Error {
                error: error.into(),
            },
        }
    }

    pub fn from_result<T: Serialize>(request_id: Value, result: Result<T, CoreError>) -> Self {
        let data = result.and_then(|data| {
            serde_json::to_value(data).map_err(|e| CoreError::InvalidRequest(e.to_string()))
        });
        match data {
            Ok(data) => Self::success(request_id, data),
            Err(e) => e.into_response(request_id),
        }
    }
}

impl CoreError {
    pub fn into_response(self, request_id: Value) -> Response {
        Response::error(request_id, self.to_string())
    }
}
