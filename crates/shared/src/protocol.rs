use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ErrorCode};

pub const MAX_PATH_SEGMENTS: usize = 8;

/// Slash-separated path of a document on the relay, e.g. `boards/friday`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "document path must not be empty",
            ));
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() > MAX_PATH_SEGMENTS {
            return Err(ApiError::new(
                ErrorCode::Validation,
                format!("document path has more than {MAX_PATH_SEGMENTS} segments"),
            ));
        }
        for segment in &segments {
            let valid = !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(ApiError::new(
                    ErrorCode::Validation,
                    format!("invalid document path segment '{segment}'"),
                ));
            }
        }

        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).map_err(|e| e.message)
    }
}

impl From<DocumentPath> for String {
    fn from(value: DocumentPath) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteAck {
    pub path: DocumentPath,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DocumentEvent {
    /// Sent once when a subscription opens, then after every write or delete.
    /// `value` is `None` when nothing is stored at `path`.
    Changed {
        path: DocumentPath,
        revision: i64,
        value: Option<Value>,
    },
    Error(ApiError),
}

impl DocumentEvent {
    pub fn path(&self) -> Option<&DocumentPath> {
        match self {
            DocumentEvent::Changed { path, .. } => Some(path),
            DocumentEvent::Error(_) => None,
        }
    }
}
