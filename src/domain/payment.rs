use {
    super::gateway::Gateway,
    super::id::MerchantOrderId,
    super::item::ItemRef,
    super::status::{CanonicalStatus, IgnoreReason},
    chrono::{DateTime, Duration, Utc},
    serde::Serialize,
    uuid::Uuid,
};

/// How long a checkout session stays payable before the record is treated
/// as expired.
pub const CHECKOUT_TTL: Duration = Duration::hours(24);

/// Durable purchase attempt. Status and payment timestamps are written only
/// by the reconciliation engine; adapters may set the gateway ref once and
/// append to raw status / metadata, nothing else.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecord {
    id: Uuid,
    merchant_order_id: MerchantOrderId,
    user_id: i64,
    item: ItemRef,
    gateway: Gateway,
    gateway_ref: Option<String>,
    amount: i64,
    status: CanonicalStatus,
    raw_gateway_status: Option<String>,
    access_days: Option<i32>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    status_updated_at: DateTime<Utc>,
}

/// Field bag for rebuilding a record from storage.
#[derive(Debug)]
pub struct PaymentRecordParts {
    pub id: Uuid,
    pub merchant_order_id: MerchantOrderId,
    pub user_id: i64,
    pub item: ItemRef,
    pub gateway: Gateway,
    pub gateway_ref: Option<String>,
    pub amount: i64,
    pub status: CanonicalStatus,
    pub raw_gateway_status: Option<String>,
    pub access_days: Option<i32>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub status_updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn from_parts(parts: PaymentRecordParts) -> Self {
        Self {
            id: parts.id,
            merchant_order_id: parts.merchant_order_id,
            user_id: parts.user_id,
            item: parts.item,
            gateway: parts.gateway,
            gateway_ref: parts.gateway_ref,
            amount: parts.amount,
            status: parts.status,
            raw_gateway_status: parts.raw_gateway_status,
            access_days: parts.access_days,
            metadata: parts.metadata,
            created_at: parts.created_at,
            expires_at: parts.expires_at,
            paid_at: parts.paid_at,
            status_updated_at: parts.status_updated_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn merchant_order_id(&self) -> &MerchantOrderId {
        &self.merchant_order_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn item(&self) -> ItemRef {
        self.item
    }

    pub fn gateway(&self) -> Gateway {
        self.gateway
    }

    pub fn gateway_ref(&self) -> Option<&str> {
        self.gateway_ref.as_deref()
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn status(&self) -> CanonicalStatus {
        self.status
    }

    pub fn raw_gateway_status(&self) -> Option<&str> {
        self.raw_gateway_status.as_deref()
    }

    pub fn access_days(&self) -> Option<i32> {
        self.access_days
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn status_updated_at(&self) -> DateTime<Utc> {
        self.status_updated_at
    }

    /// Status as every read path must report it: a pending record past its
    /// expiry is expired whether or not the sweeper has persisted that yet.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CanonicalStatus {
        if self.status == CanonicalStatus::Pending && self.expires_at <= now {
            CanonicalStatus::Expired
        } else {
            self.status
        }
    }
}

/// For INSERT — ids generated in Rust.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub id: Uuid,
    pub merchant_order_id: MerchantOrderId,
    pub user_id: i64,
    pub item: ItemRef,
    pub gateway: Gateway,
    pub amount: i64,
    pub access_days: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewPaymentRecord {
    pub fn new(
        user_id: i64,
        item: ItemRef,
        gateway: Gateway,
        amount: i64,
        access_days: Option<i32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            merchant_order_id: MerchantOrderId::generate(),
            user_id,
            item,
            gateway,
            amount,
            access_days,
            created_at: now,
            expires_at: now + CHECKOUT_TTL,
        }
    }
}

/// What `apply_transition` did with a canonical status. Ignored outcomes are
/// ordinary results callers branch on, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedOutcome {
    Applied {
        from: CanonicalStatus,
        to: CanonicalStatus,
    },
    Ignored(IgnoreReason),
}
