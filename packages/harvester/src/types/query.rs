//! Query operation and pagination types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, parameterized request document executed against the remote
/// application's query endpoint.
///
/// Sourced from a query catalog once per run. The variable list declares
/// which variable names the document expects; callers supply values for a
/// subset of them per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOperation {
    /// Operation name as the remote endpoint knows it
    pub name: String,

    /// The query document itself
    pub document: String,

    /// Declared variable names
    #[serde(default)]
    pub variables: Vec<String>,
}

impl QueryOperation {
    pub fn new(name: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            document: document.into(),
            variables: Vec::new(),
        }
    }

    /// Declare the variable names the document expects.
    pub fn with_variables(mut self, vars: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.variables = vars.into_iter().map(|v| v.into()).collect();
        self
    }
}

/// Opaque continuation marker for one paginated call sequence.
///
/// Produced and consumed entirely within `run_paginated`; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// Continuation token for the next page, if any
    pub cursor: Option<String>,

    /// Whether the remote reports more pages available
    pub has_next: bool,
}

impl PageCursor {
    /// Starting cursor for the first page of a sequence.
    pub fn start() -> Self {
        Self {
            cursor: None,
            has_next: true,
        }
    }
}

/// Top-level envelope of every query response.
#[derive(Debug, Deserialize)]
pub struct QueryEnvelope {
    /// Payload, absent when the call failed at the application level
    pub data: Option<Value>,

    /// Application-level errors reported alongside (or instead of) data
    #[serde(default)]
    pub errors: Vec<RemoteError>,
}

/// One application-level error entry in a query response.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteError {
    pub message: String,

    /// Machine-readable code, when the remote provides one
    #[serde(default)]
    pub code: Option<String>,
}

impl RemoteError {
    /// Whether this error means the session's authorization was rejected.
    pub fn is_auth_error(&self) -> bool {
        if let Some(code) = &self.code {
            let code = code.to_ascii_uppercase();
            if code == "UNAUTHENTICATED" || code == "UNAUTHORIZED" || code == "FORBIDDEN" {
                return true;
            }
        }
        let msg = self.message.to_lowercase();
        msg.contains("not authorized") || msg.contains("not authenticated")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_recognized_by_code_and_message() {
        let by_code = RemoteError {
            message: "nope".into(),
            code: Some("UNAUTHENTICATED".into()),
        };
        assert!(by_code.is_auth_error());

        let by_message = RemoteError {
            message: "User is not authorized to view this resource".into(),
            code: None,
        };
        assert!(by_message.is_auth_error());

        let other = RemoteError {
            message: "field 'foo' not found".into(),
            code: Some("BAD_REQUEST".into()),
        };
        assert!(!other.is_auth_error());
    }

    #[test]
    fn envelope_parses_without_errors_field() {
        let envelope: QueryEnvelope =
            serde_json::from_str(r#"{"data": {"ok": true}}"#).unwrap();
        assert!(envelope.data.is_some());
        assert!(envelope.errors.is_empty());
    }
}
