//! Audit timestamps embedded in every entity.
//!
//! The write path calls [`AuditFields::on_insert`] / [`AuditFields::on_update`]
//! explicitly; nothing stamps these fields implicitly.

use std::time::{SystemTime, UNIX_EPOCH};

/// Creation and last-modification timestamps, epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditFields {
    created_date: Option<i64>,
    updated_date: Option<i64>,
}

impl AuditFields {
    /// Restores fields read back from storage.
    pub fn from_persisted(created_date: i64, updated_date: i64) -> Self {
        Self {
            created_date: Some(created_date),
            updated_date: Some(updated_date),
        }
    }

    /// Stamps both fields. A second call keeps the original `created_date`.
    pub fn on_insert(&mut self, now: i64) {
        if self.created_date.is_none() {
            self.created_date = Some(now);
        }
        self.updated_date = Some(now);
    }

    pub fn on_update(&mut self, now: i64) {
        self.updated_date = Some(now);
    }

    pub fn created_date(&self) -> Option<i64> {
        self.created_date
    }

    pub fn updated_date(&self) -> Option<i64> {
        self.updated_date
    }
}

/// Wall clock in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
