//! User-facing purchase API. Every operation takes the user id explicitly —
//! the core has no notion of an ambient "current user".

use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{
            error::PaymentError,
            gateway::{Customer, Gateway},
            item::{ItemKind, ItemRef},
            status::CanonicalStatus,
        },
        infra::postgres::payment_repo,
        services::{
            purchase::{PurchaseOutcome, PurchaseRequest, start_purchase},
            reconciliation::{cancel_purchase, check_and_reconcile},
        },
    },
    axum::{
        Json,
        extract::{Path, Query, State},
    },
    chrono::Utc,
    serde::Deserialize,
};

#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    pub user_id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub gateway: String,
    pub customer_name: String,
    pub customer_email: String,
}

pub async fn create_purchase(
    State(state): State<AppState>,
    Json(body): Json<PurchaseBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let req = PurchaseRequest {
        user_id: body.user_id,
        item: ItemRef::new(
            ItemKind::try_from(body.item_type.as_str())?,
            body.item_id,
        ),
        gateway: Gateway::try_from(body.gateway.as_str())?,
        customer: Customer {
            name: body.customer_name,
            email: body.customer_email,
        },
    };

    let outcome = start_purchase(&state.pool, &state.gateways, state.catalog.as_ref(), req).await?;
    let reused = matches!(outcome, PurchaseOutcome::Existing { .. });
    let record = outcome.record();
    let checkout = outcome.checkout();

    Ok(Json(serde_json::json!({
        "merchant_order_id": record.merchant_order_id(),
        "gateway": record.gateway().as_str(),
        "amount": record.amount(),
        "expires_at": record.expires_at(),
        "redirect_url": checkout.redirect_url,
        "reused_pending": reused,
    })))
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub user_id: i64,
}

/// Current canonical status, refreshed with an active gateway poll while the
/// record is still pending.
pub async fn purchase_status(
    State(state): State<AppState>,
    Path(merchant_order_id): Path<String>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = owned_record(&state, &merchant_order_id, owner.user_id).await?;

    let adapter = state.gateways.get(record.gateway());
    let status = check_and_reconcile(&state.pool, adapter, &record, "poll:user").await?;

    Ok(Json(serde_json::json!({
        "merchant_order_id": record.merchant_order_id(),
        "status": status,
        "paid_at": record.paid_at(),
        "expires_at": record.expires_at(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub user_id: i64,
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(merchant_order_id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = owned_record(&state, &merchant_order_id, body.user_id).await?;

    let adapter = state.gateways.get(record.gateway());
    let outcome = cancel_purchase(&state.pool, adapter, &record).await?;

    let fresh = payment_repo::find_by_order_id(&state.pool, &merchant_order_id)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("payment {merchant_order_id}")))?;

    Ok(Json(serde_json::json!({
        "merchant_order_id": fresh.merchant_order_id(),
        "status": fresh.effective_status(Utc::now()),
        "cancelled": matches!(
            outcome,
            crate::domain::payment::AppliedOutcome::Applied {
                to: CanonicalStatus::Cancelled,
                ..
            }
        ),
    })))
}

/// Ownership check: a record belonging to someone else reads as not-found
/// rather than leaking its existence.
async fn owned_record(
    state: &AppState,
    merchant_order_id: &str,
    user_id: i64,
) -> Result<crate::domain::payment::PaymentRecord, PaymentError> {
    let record = payment_repo::find_by_order_id(&state.pool, merchant_order_id)
        .await?
        .filter(|r| r.user_id() == user_id)
        .ok_or_else(|| PaymentError::NotFound(format!("payment {merchant_order_id}")))?;
    Ok(record)
}
