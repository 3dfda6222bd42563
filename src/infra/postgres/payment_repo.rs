use {
    crate::domain::{
        error::PaymentError,
        gateway::Gateway,
        id::MerchantOrderId,
        item::{ItemKind, ItemRef},
        payment::{NewPaymentRecord, PaymentRecord, PaymentRecordParts},
        status::CanonicalStatus,
    },
    chrono::{DateTime, Utc},
    sqlx::postgres::PgExecutor,
    uuid::Uuid,
};

const RECORD_COLUMNS: &str = "id, merchant_order_id, user_id, item_type, item_id, gateway, \
     gateway_ref, amount, status, raw_gateway_status, access_days, metadata, \
     created_at, expires_at, paid_at, status_updated_at";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    merchant_order_id: String,
    user_id: i64,
    item_type: String,
    item_id: i64,
    gateway: String,
    gateway_ref: Option<String>,
    amount: i64,
    status: String,
    raw_gateway_status: Option<String>,
    access_days: Option<i32>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    status_updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = PaymentError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(PaymentRecord::from_parts(PaymentRecordParts {
            id: row.id,
            merchant_order_id: MerchantOrderId::new(row.merchant_order_id)?,
            user_id: row.user_id,
            item: ItemRef::new(ItemKind::try_from(row.item_type.as_str())?, row.item_id),
            gateway: Gateway::try_from(row.gateway.as_str())?,
            gateway_ref: row.gateway_ref,
            amount: row.amount,
            status: CanonicalStatus::try_from(row.status.as_str())?,
            raw_gateway_status: row.raw_gateway_status,
            access_days: row.access_days,
            metadata: row.metadata,
            created_at: row.created_at,
            expires_at: row.expires_at,
            paid_at: row.paid_at,
            status_updated_at: row.status_updated_at,
        }))
    }
}

pub async fn insert(
    exec: impl PgExecutor<'_>,
    record: &NewPaymentRecord,
) -> Result<(), PaymentError> {
    sqlx::query(
        r#"
        INSERT INTO payments
            (id, merchant_order_id, user_id, item_type, item_id, gateway,
             amount, status, access_days, created_at, expires_at,
             status_updated_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, $10, $9, $9)
        "#,
    )
    .bind(record.id)
    .bind(record.merchant_order_id.as_str())
    .bind(record.user_id)
    .bind(record.item.kind.as_str())
    .bind(record.item.item_id)
    .bind(record.gateway.as_str())
    .bind(record.amount)
    .bind(record.access_days)
    .bind(record.created_at)
    .bind(record.expires_at)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn find_by_order_id(
    exec: impl PgExecutor<'_>,
    merchant_order_id: &str,
) -> Result<Option<PaymentRecord>, PaymentError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {RECORD_COLUMNS} FROM payments WHERE merchant_order_id = $1"
    ))
    .bind(merchant_order_id)
    .fetch_optional(exec)
    .await?;

    row.map(PaymentRecord::try_from).transpose()
}

pub async fn find_by_gateway_ref(
    exec: impl PgExecutor<'_>,
    gateway: Gateway,
    gateway_ref: &str,
) -> Result<Option<PaymentRecord>, PaymentError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {RECORD_COLUMNS} FROM payments WHERE gateway = $1 AND gateway_ref = $2"
    ))
    .bind(gateway.as_str())
    .bind(gateway_ref)
    .fetch_optional(exec)
    .await?;

    row.map(PaymentRecord::try_from).transpose()
}

/// Duplicate guard lookup: a still-payable pending record for this (user, item).
/// The expiry comparison happens here, so a stale pending record is invisible
/// even before the sweeper has persisted its transition.
pub async fn find_payable_pending(
    exec: impl PgExecutor<'_>,
    user_id: i64,
    item: ItemRef,
    now: DateTime<Utc>,
) -> Result<Option<PaymentRecord>, PaymentError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"
        SELECT {RECORD_COLUMNS} FROM payments
        WHERE user_id = $1 AND item_type = $2 AND item_id = $3
          AND status = 'pending' AND expires_at > $4
        ORDER BY created_at DESC
        LIMIT 1
        "#
    ))
    .bind(user_id)
    .bind(item.kind.as_str())
    .bind(item.item_id)
    .bind(now)
    .fetch_optional(exec)
    .await?;

    row.map(PaymentRecord::try_from).transpose()
}

pub async fn has_completed(
    exec: impl PgExecutor<'_>,
    user_id: i64,
    item: ItemRef,
) -> Result<bool, PaymentError> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM payments
            WHERE user_id = $1 AND item_type = $2 AND item_id = $3
              AND status = 'completed'
        )
        "#,
    )
    .bind(user_id)
    .bind(item.kind.as_str())
    .bind(item.item_id)
    .fetch_one(exec)
    .await?;
    Ok(exists)
}

/// Record the gateway's acknowledgement of a checkout. The correlation id is
/// set-once (COALESCE keeps the first value); the response payload is appended
/// to the metadata bag, never replacing earlier entries.
pub async fn record_checkout_ack(
    exec: impl PgExecutor<'_>,
    id: Uuid,
    gateway_ref: &str,
    response: &serde_json::Value,
) -> Result<(), PaymentError> {
    sqlx::query(
        r#"
        UPDATE payments
        SET gateway_ref = COALESCE(gateway_ref, $2),
            metadata = metadata || $3,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(gateway_ref)
    .bind(response)
    .execute(exec)
    .await?;
    Ok(())
}

/// The compare-and-set at the heart of the reconciliation engine: only a
/// record still in `pending` can move, so of two racing callers exactly one
/// observes an affected row.
pub async fn cas_transition(
    exec: impl PgExecutor<'_>,
    id: Uuid,
    to: CanonicalStatus,
    raw_gateway_status: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, PaymentError> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET status = $2,
            raw_gateway_status = COALESCE($3, raw_gateway_status),
            paid_at = CASE WHEN $2 = 'completed' THEN $4 ELSE paid_at END,
            status_updated_at = $4,
            updated_at = now()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(to.as_str())
    .bind(raw_gateway_status)
    .bind(now)
    .execute(exec)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Best-effort persistence of read-time expiry. Returns the number of rows
/// swept; correctness never depends on this running.
pub async fn sweep_expired(
    exec: impl PgExecutor<'_>,
    now: DateTime<Utc>,
) -> Result<u64, PaymentError> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET status = 'expired', status_updated_at = $1, updated_at = now()
        WHERE status = 'pending' AND expires_at <= $1
        "#,
    )
    .bind(now)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}
