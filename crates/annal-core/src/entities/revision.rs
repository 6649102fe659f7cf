use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RevisionId;

/// One entry of the revision log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Revision {
    pub id: RevisionId,
    pub timestamp: DateTime<Utc>,
    /// Identity the change is attributed to, if the resolver produced one.
    pub actor: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
