//! Inbound notification handlers. Verification always runs before any state
//! read or write; both Applied and Ignored outcomes answer 200 so gateways
//! stop redelivering, while internal errors surface as 5xx to trigger retry.

use {
    crate::{
        AppState,
        domain::{
            error::PaymentError,
            gateway::Gateway,
            payment::AppliedOutcome,
            status::CanonicalStatus,
        },
        adapters::api_errors::ApiError,
        infra::postgres::payment_repo,
        services::reconciliation::{apply_transition, check_and_reconcile},
    },
    axum::{
        Form, Json,
        extract::{Query, State},
        response::Redirect,
    },
    serde::Deserialize,
};

fn outcome_reply(outcome: AppliedOutcome) -> Json<serde_json::Value> {
    let status = match outcome {
        AppliedOutcome::Applied { .. } => "applied",
        AppliedOutcome::Ignored(reason) => {
            return Json(serde_json::json!({"status": "ignored", "reason": reason}));
        }
    };
    Json(serde_json::json!({"status": status}))
}

#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(gateway = "midtrans", order_id = tracing::field::Empty)
)]
pub async fn midtrans_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let adapter = state.gateways.get(Gateway::Midtrans);

    if !adapter.verify_notification(&payload) {
        tracing::warn!(payload = %payload, "midtrans notification signature rejected");
        return Err(PaymentError::InvalidSignature("midtrans notification".into()).into());
    }

    let order_id = payload
        .get("order_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| PaymentError::Validation("missing order_id".into()))?;
    tracing::Span::current().record("order_id", tracing::field::display(order_id));

    let incoming = adapter.translate_status(&payload);
    let raw = payload
        .get("transaction_status")
        .and_then(|v| v.as_str())
        .unwrap_or("absent");

    if incoming == CanonicalStatus::Unknown {
        tracing::warn!(raw, "unrecognized midtrans vocabulary, possible API change");
    }

    let outcome = apply_transition(&state.pool, order_id, incoming, Some(raw), "webhook:midtrans")
        .await?;
    Ok(outcome_reply(outcome))
}

/// Duitku posts callbacks form-encoded. Fields are optional here so that a
/// missing field reaches signature verification (which fails closed) instead
/// of bouncing off the extractor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuitkuCallback {
    merchant_code: Option<String>,
    amount: Option<String>,
    merchant_order_id: Option<String>,
    result_code: Option<String>,
    reference: Option<String>,
    signature: Option<String>,
}

#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(gateway = "duitku", order_id = tracing::field::Empty)
)]
pub async fn duitku_webhook(
    State(state): State<AppState>,
    Form(callback): Form<DuitkuCallback>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let adapter = state.gateways.get(Gateway::Duitku);

    let payload = serde_json::json!({
        "merchantCode": callback.merchant_code,
        "amount": callback.amount,
        "merchantOrderId": callback.merchant_order_id,
        "resultCode": callback.result_code,
        "reference": callback.reference,
        "signature": callback.signature,
    });

    if !adapter.verify_notification(&payload) {
        tracing::warn!(payload = %payload, "duitku callback signature rejected");
        return Err(PaymentError::InvalidSignature("duitku callback".into()).into());
    }

    // Verified payloads always carry the order id.
    let order_id = callback
        .merchant_order_id
        .as_deref()
        .ok_or_else(|| PaymentError::Validation("missing merchantOrderId".into()))?;
    tracing::Span::current().record("order_id", tracing::field::display(order_id));

    let incoming = adapter.translate_status(&payload);
    let raw = callback.result_code.as_deref().unwrap_or("absent");

    if incoming == CanonicalStatus::Unknown {
        tracing::warn!(raw, "unrecognized duitku result code, possible API change");
    }

    let outcome =
        apply_transition(&state.pool, order_id, incoming, Some(raw), "webhook:duitku").await?;
    Ok(outcome_reply(outcome))
}

#[derive(Debug, Deserialize)]
pub struct DuitkuReturnParams {
    #[serde(rename = "merchantOrderId")]
    merchant_order_id: String,
}

/// Browser lands here after paying on Duitku's page. The redirect itself is
/// untrusted — we poll the gateway and reconcile before deciding where to
/// send the user.
#[tracing::instrument(name = "return_redirect", skip_all, fields(gateway = "duitku"))]
pub async fn duitku_return(
    State(state): State<AppState>,
    Query(params): Query<DuitkuReturnParams>,
) -> Result<Redirect, ApiError> {
    let record = payment_repo::find_by_order_id(&state.pool, &params.merchant_order_id)
        .await?
        .ok_or_else(|| {
            PaymentError::NotFound(format!("payment {}", params.merchant_order_id))
        })?;

    let adapter = state.gateways.get(record.gateway());
    let status = check_and_reconcile(&state.pool, adapter, &record, "return:duitku").await?;

    let target = if status == CanonicalStatus::Completed {
        &state.return_success_url
    } else {
        &state.return_failure_url
    };

    Ok(Redirect::to(&format!(
        "{target}?order={}&status={status}",
        params.merchant_order_id
    )))
}
