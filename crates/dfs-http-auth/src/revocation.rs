//! Revoked token ids.
//!
//! Entries are kept until the token would have expired anyway; after that
//! verification rejects the token on `exp` and the entry can be purged.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

/// Shared set of revoked token ids with their expiry times.
#[derive(Debug, Clone, Default)]
pub struct RevocationList {
    entries: Arc<RwLock<HashMap<Uuid, DateTime<Utc>>>>,
}

impl RevocationList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Revokes a token id until `expires_at`.
    pub fn revoke(&self, id: Uuid, expires_at: DateTime<Utc>) {
        self.entries.write().insert(id, expires_at);
        tracing::debug!(token_id = %id, "token revoked");
    }

    /// Returns `true` if the id is revoked.
    #[must_use]
    pub fn is_revoked(&self, id: &Uuid) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Drops entries whose tokens expired at or before `now`. Returns how many were dropped.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Number of revoked ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is revoked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
