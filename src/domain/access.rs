use {
    super::item::ItemRef,
    chrono::{DateTime, Utc},
    serde::Serialize,
    uuid::Uuid,
};

/// Access grant row: at most one active grant per (user, item) pair.
/// Created and updated only by the access grant service; never deleted —
/// expiry is a read-time check.
#[derive(Debug, Clone, Serialize)]
pub struct AccessGrant {
    pub id: Uuid,
    pub user_id: i64,
    pub item: ItemRef,
    /// Payment that caused the grant; None for free/manual grants.
    pub granted_via: Option<Uuid>,
    pub granted_at: DateTime<Utc>,
    /// None = perpetual.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessGrant {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|e| e > now)
    }
}

/// What `grant_for` did. `AlreadyGranted` is the idempotent no-op for a
/// repeated invocation with the same payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted,
    Extended,
    AlreadyGranted,
}
