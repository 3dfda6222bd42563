use {
    super::error::PaymentError,
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Module,
    Course,
    Test,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Course => "course",
            Self::Test => "test",
        }
    }
}

impl TryFrom<&str> for ItemKind {
    type Error = PaymentError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "module" => Ok(Self::Module),
            "course" => Ok(Self::Course),
            "test" => Ok(Self::Test),
            other => Err(PaymentError::Validation(format!(
                "unknown item kind: {other}"
            ))),
        }
    }
}

/// Reference to a purchasable item in the (external) catalog.
/// Exactly one kind at a time — the tagged union a payment unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(rename = "id")]
    pub item_id: i64,
}

impl ItemRef {
    pub fn new(kind: ItemKind, item_id: i64) -> Self {
        Self { kind, item_id }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.item_id)
    }
}

/// Expiry for a fresh grant: paid_at + duration, perpetual when the item
/// carries no duration policy.
pub fn fresh_grant_expiry(
    paid_at: DateTime<Utc>,
    access_days: Option<i32>,
) -> Option<DateTime<Utc>> {
    access_days.map(|d| paid_at + Duration::days(i64::from(d)))
}

/// Expiry when a grant for the pair already exists and a *different* payment
/// completes. Extends from whichever is later: the current expiry or the new
/// payment time — a lapsed grant restarts from paid_at instead of back-dating.
/// Deterministic in (existing, paid_at, access_days); repeated invocation for
/// one payment is screened out by the caller via granted_via, so extension
/// can never compound.
pub fn extended_grant_expiry(
    existing: Option<DateTime<Utc>>,
    paid_at: DateTime<Utc>,
    access_days: Option<i32>,
) -> Option<DateTime<Utc>> {
    match (existing, access_days) {
        // Perpetual stays perpetual.
        (None, _) => None,
        (Some(_), None) => None,
        (Some(current), Some(d)) => Some(current.max(paid_at) + Duration::days(i64::from(d))),
    }
}
