use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::rider::Rider;

/// Position of an event in the rider change feed. Strictly increasing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResumeToken(pub u64);

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Insert,
    Update,
    Replace,
    Delete,
    #[serde(other)]
    Unknown,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "insert",
            OperationType::Update => "update",
            OperationType::Replace => "replace",
            OperationType::Delete => "delete",
            OperationType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub token: ResumeToken,
    pub operation_type: OperationType,
    pub document_key: Uuid,
    /// Post-change document; absent for deletes.
    pub full_document: Option<Rider>,
    pub cluster_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ChangeEvent, OperationType};

    #[test]
    fn unrecognised_operation_type_is_not_an_error() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "token": 7,
            "operation_type": "invalidate",
            "document_key": "00000000-0000-0000-0000-000000000001",
            "full_document": null,
            "cluster_time": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(event.operation_type, OperationType::Unknown);
        assert_eq!(event.token.0, 7);
    }
}
