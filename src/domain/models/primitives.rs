//! Distributed counter and lock record shapes, persisted in the store under
//! `counter/<name>` and `lock/<name>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterRecord {
    pub value: i64,
    pub timestamp: DateTime<Utc>,
}

/// `holder` empty iff `expires_at <= now`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub owner: String,
    pub expires_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl LockRecord {
    pub fn is_held(&self) -> bool {
        Utc::now() < self.expires_at
    }
}
