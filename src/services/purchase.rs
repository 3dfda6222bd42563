//! Purchase flow: duplicate/expiry guard, record creation, checkout issuance.

use {
    crate::domain::{
        audit::NewAuditEntry,
        catalog::Catalog,
        error::PaymentError,
        gateway::{CheckoutSession, Customer, Gateway, GatewayAdapter},
        item::ItemRef,
        payment::{NewPaymentRecord, PaymentRecord, PaymentRecordParts},
        status::CanonicalStatus,
    },
    crate::infra::postgres::{audit_repo::insert_audit_entry, payment_repo},
    chrono::Utc,
    sqlx::PgPool,
    std::sync::Arc,
};

/// Adapter lookup by gateway. New gateways are added here and nowhere else —
/// the engine never learns gateway specifics.
#[derive(Clone)]
pub struct GatewayRegistry {
    midtrans: Arc<dyn GatewayAdapter>,
    duitku: Arc<dyn GatewayAdapter>,
}

impl GatewayRegistry {
    pub fn new(midtrans: Arc<dyn GatewayAdapter>, duitku: Arc<dyn GatewayAdapter>) -> Self {
        Self { midtrans, duitku }
    }

    pub fn get(&self, gateway: Gateway) -> &dyn GatewayAdapter {
        match gateway {
            Gateway::Midtrans => self.midtrans.as_ref(),
            Gateway::Duitku => self.duitku.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub user_id: i64,
    pub item: ItemRef,
    pub gateway: Gateway,
    pub customer: Customer,
}

#[derive(Debug)]
pub enum PurchaseOutcome {
    /// Fresh record created and checkout opened.
    New {
        record: PaymentRecord,
        checkout: CheckoutSession,
    },
    /// A payable pending record already existed; its checkout was re-issued.
    Existing {
        record: PaymentRecord,
        checkout: CheckoutSession,
    },
}

impl PurchaseOutcome {
    pub fn record(&self) -> &PaymentRecord {
        match self {
            Self::New { record, .. } | Self::Existing { record, .. } => record,
        }
    }

    pub fn checkout(&self) -> &CheckoutSession {
        match self {
            Self::New { checkout, .. } | Self::Existing { checkout, .. } => checkout,
        }
    }
}

/// Start (or resume) a purchase.
///
/// The guard checks and the insert run in one transaction under an advisory
/// lock per (user, item), so two racing purchase requests can never create
/// two pending records for the same pair. The gateway call happens after
/// commit — blocking I/O is kept out of the lock.
pub async fn start_purchase(
    pool: &PgPool,
    registry: &GatewayRegistry,
    catalog: &dyn Catalog,
    req: PurchaseRequest,
) -> Result<PurchaseOutcome, PaymentError> {
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("purchase:{}:{}", req.user_id, req.item))
        .execute(&mut *tx)
        .await?;

    if payment_repo::has_completed(&mut *tx, req.user_id, req.item).await? {
        tx.commit().await?;
        return Err(PaymentError::AlreadyOwned);
    }

    if let Some(existing) =
        payment_repo::find_payable_pending(&mut *tx, req.user_id, req.item, now).await?
    {
        tx.commit().await?;
        return reissue_checkout(pool, registry, existing, &req.customer).await;
    }

    // Snapshot price and duration policy from the catalog at purchase time.
    let catalog_item = catalog.lookup(req.item).await?;
    let new_record = NewPaymentRecord::new(
        req.user_id,
        req.item,
        req.gateway,
        catalog_item.price,
        catalog_item.access_days,
        now,
    );
    payment_repo::insert(&mut *tx, &new_record).await?;

    let mut audit = NewAuditEntry::payment(
        new_record.id,
        new_record.merchant_order_id.as_str(),
        "created",
        "purchase",
    );
    audit.detail = serde_json::json!({
        "user_id": req.user_id,
        "item": req.item.to_string(),
        "gateway": req.gateway.as_str(),
        "amount": catalog_item.price,
        "access_days": catalog_item.access_days,
    });
    insert_audit_entry(&mut *tx, &audit).await?;
    tx.commit().await?;

    let record = PaymentRecord::from_parts(PaymentRecordParts {
        id: new_record.id,
        merchant_order_id: new_record.merchant_order_id,
        user_id: new_record.user_id,
        item: new_record.item,
        gateway: new_record.gateway,
        gateway_ref: None,
        amount: new_record.amount,
        status: CanonicalStatus::Pending,
        raw_gateway_status: None,
        access_days: new_record.access_days,
        metadata: serde_json::json!({}),
        created_at: new_record.created_at,
        expires_at: new_record.expires_at,
        paid_at: None,
        status_updated_at: new_record.created_at,
    });

    // If this call fails the record stays pending without a gateway ref; the
    // user's retry lands in the reissue branch above, which is safe.
    let adapter = registry.get(record.gateway());
    let checkout = adapter.create_checkout(&record, &req.customer).await?;
    payment_repo::record_checkout_ack(
        pool,
        record.id(),
        &checkout.gateway_ref,
        &serde_json::json!({ "checkout": { "redirect_url": checkout.redirect_url } }),
    )
    .await?;

    tracing::info!(
        order_id = %record.merchant_order_id(),
        gateway = %record.gateway(),
        amount = record.amount(),
        "purchase started"
    );

    Ok(PurchaseOutcome::New { record, checkout })
}

/// Duplicate guard hit: re-request a redirect target for the existing record
/// via its own gateway, never minting a second PaymentRecord.
async fn reissue_checkout(
    pool: &PgPool,
    registry: &GatewayRegistry,
    record: PaymentRecord,
    customer: &Customer,
) -> Result<PurchaseOutcome, PaymentError> {
    let adapter = registry.get(record.gateway());
    let checkout = adapter.create_checkout(&record, customer).await?;
    payment_repo::record_checkout_ack(
        pool,
        record.id(),
        &checkout.gateway_ref,
        &serde_json::json!({ "checkout_reissued": { "redirect_url": checkout.redirect_url } }),
    )
    .await?;

    tracing::info!(
        order_id = %record.merchant_order_id(),
        gateway = %record.gateway(),
        "pending purchase found, checkout re-issued"
    );

    Ok(PurchaseOutcome::Existing { record, checkout })
}
