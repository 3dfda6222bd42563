//! Reconciliation engine: the single writer of payment status.
//!
//! Webhooks, manual polls, user cancels and the sweeper all funnel into
//! `apply_transition`, which serializes work per merchant order id with an
//! advisory lock and moves status with a compare-and-set so racing callers
//! cannot both win.

use {
    crate::domain::{
        audit::NewAuditEntry,
        error::PaymentError,
        gateway::GatewayAdapter,
        payment::{AppliedOutcome, PaymentRecord},
        status::{CanonicalStatus, IgnoreReason, TransitionDecision, decide},
    },
    crate::infra::postgres::{audit_repo::insert_audit_entry, payment_repo},
    crate::services::access_grant,
    chrono::Utc,
    sqlx::PgPool,
};

/// Apply a canonical status to a payment record. Returns what happened;
/// `Ignored` outcomes are normal (late webhooks, duplicates, unknown
/// vocabulary) and callers branch on them rather than on errors.
pub async fn apply_transition(
    pool: &PgPool,
    merchant_order_id: &str,
    incoming: CanonicalStatus,
    raw_gateway_status: Option<&str>,
    actor: &str,
) -> Result<AppliedOutcome, PaymentError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    // Serialize all transitions for this order.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(merchant_order_id)
        .execute(&mut *tx)
        .await?;

    let record = payment_repo::find_by_order_id(&mut *tx, merchant_order_id)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("payment {merchant_order_id}")))?;

    let current = record.status();

    match decide(current, incoming) {
        TransitionDecision::Ignore(reason) => {
            audit_ignored(&mut tx, &record, incoming, raw_gateway_status, reason, actor).await?;
            tx.commit().await?;

            if reason == IgnoreReason::AlreadyTerminal && incoming != current {
                tracing::warn!(
                    order_id = %merchant_order_id,
                    %current,
                    %incoming,
                    actor,
                    "conflicting notification for terminal payment, ignored"
                );
            }

            // A completed record seeing another completed notification is a
            // redelivery; re-running the idempotent grant repairs any grant
            // that failed after the original transition.
            if current == CanonicalStatus::Completed && incoming == CanonicalStatus::Completed {
                ensure_granted(pool, &record, actor).await?;
            }

            Ok(AppliedOutcome::Ignored(reason))
        }
        TransitionDecision::Apply => {
            let now = Utc::now();
            let won =
                payment_repo::cas_transition(&mut *tx, record.id(), incoming, raw_gateway_status, now)
                    .await?;

            if !won {
                // A concurrent caller moved the record first.
                tx.commit().await?;
                return Ok(AppliedOutcome::Ignored(IgnoreReason::AlreadyTerminal));
            }

            let mut audit = NewAuditEntry::payment(
                record.id(),
                merchant_order_id,
                "status_changed",
                actor,
            );
            audit.detail = serde_json::json!({
                "old_status": current.as_str(),
                "new_status": incoming.as_str(),
                "raw_gateway_status": raw_gateway_status,
            });
            insert_audit_entry(&mut *tx, &audit).await?;
            tx.commit().await?;

            tracing::info!(
                order_id = %merchant_order_id,
                from = %current,
                to = %incoming,
                actor,
                "payment status changed"
            );

            if incoming == CanonicalStatus::Completed {
                // Grant runs after the status commit: payment truth is
                // separate from grant truth, so a grant failure must not
                // roll the completed status back.
                let completed = payment_repo::find_by_order_id(pool, merchant_order_id)
                    .await?
                    .ok_or_else(|| {
                        PaymentError::NotFound(format!("payment {merchant_order_id}"))
                    })?;
                ensure_granted(pool, &completed, actor).await?;
            }

            Ok(AppliedOutcome::Applied {
                from: current,
                to: incoming,
            })
        }
    }
}

async fn audit_ignored(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &PaymentRecord,
    incoming: CanonicalStatus,
    raw_gateway_status: Option<&str>,
    reason: IgnoreReason,
    actor: &str,
) -> Result<(), PaymentError> {
    let action = match reason {
        IgnoreReason::AlreadyTerminal if incoming != record.status() => "conflicting_notification",
        _ => "notification_ignored",
    };
    let mut audit = NewAuditEntry::payment(
        record.id(),
        record.merchant_order_id().as_str(),
        action,
        actor,
    );
    audit.detail = serde_json::json!({
        "current_status": record.status().as_str(),
        "incoming_status": incoming.as_str(),
        "raw_gateway_status": raw_gateway_status,
        "reason": reason,
    });
    insert_audit_entry(&mut **tx, &audit).await
}

/// Run the grant service for a completed record, converting failure into the
/// alerting path: audited, logged at error level, surfaced as an error so the
/// webhook responds 5xx and the gateway redelivers.
async fn ensure_granted(
    pool: &PgPool,
    record: &PaymentRecord,
    actor: &str,
) -> Result<(), PaymentError> {
    match access_grant::grant_for(pool, record).await {
        Ok(outcome) => {
            tracing::debug!(order_id = %record.merchant_order_id(), ?outcome, "grant ensured");
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                order_id = %record.merchant_order_id(),
                user_id = record.user_id(),
                item = %record.item(),
                error = %e,
                "access grant failed after completed payment"
            );
            let mut audit = NewAuditEntry::payment(
                record.id(),
                record.merchant_order_id().as_str(),
                "grant_failed",
                actor,
            );
            audit.detail = serde_json::json!({ "error": e.to_string() });
            // Best effort — the tracing line above is the alert of record.
            if let Err(audit_err) = insert_audit_entry(pool, &audit).await {
                tracing::error!(error = %audit_err, "failed to audit grant failure");
            }
            Err(PaymentError::AccessGrant(e.to_string()))
        }
    }
}

/// Actively poll the gateway and reconcile the result. Used by the manual
/// status endpoint and the return-redirect flow, where no webhook may have
/// landed yet. Returns the record's effective status after reconciliation.
pub async fn check_and_reconcile(
    pool: &PgPool,
    adapter: &dyn GatewayAdapter,
    record: &PaymentRecord,
    actor: &str,
) -> Result<CanonicalStatus, PaymentError> {
    let now = Utc::now();

    // Only a live pending record is worth a gateway round-trip.
    if record.effective_status(now) != CanonicalStatus::Pending {
        return Ok(record.effective_status(now));
    }

    let probe = adapter.check_status(record).await?;
    let outcome = apply_transition(
        pool,
        record.merchant_order_id().as_str(),
        probe.status,
        Some(&probe.raw),
        actor,
    )
    .await?;

    Ok(match outcome {
        AppliedOutcome::Applied { to, .. } => to,
        AppliedOutcome::Ignored(_) => {
            let fresh = payment_repo::find_by_order_id(pool, record.merchant_order_id().as_str())
                .await?
                .ok_or_else(|| {
                    PaymentError::NotFound(format!("payment {}", record.merchant_order_id()))
                })?;
            fresh.effective_status(Utc::now())
        }
    })
}

/// User-initiated cancel. The upstream gateway cancel is attempted first, but
/// an unreachable (or absent) gateway never blocks the local transition:
/// local consistency wins, and the degraded path is recorded for audit.
pub async fn cancel_purchase(
    pool: &PgPool,
    adapter: &dyn GatewayAdapter,
    record: &PaymentRecord,
) -> Result<AppliedOutcome, PaymentError> {
    let degraded = match adapter.cancel(record).await {
        Ok(()) => false,
        Err(e) => {
            tracing::warn!(
                order_id = %record.merchant_order_id(),
                gateway = %record.gateway(),
                error = %e,
                "upstream cancel failed, proceeding with local cancel"
            );
            true
        }
    };

    let outcome = apply_transition(
        pool,
        record.merchant_order_id().as_str(),
        CanonicalStatus::Cancelled,
        None,
        "user_cancel",
    )
    .await?;

    if degraded {
        if let AppliedOutcome::Applied { .. } = outcome {
            let mut audit = NewAuditEntry::payment(
                record.id(),
                record.merchant_order_id().as_str(),
                "cancel_degraded",
                "user_cancel",
            );
            audit.detail = serde_json::json!({
                "reason": "upstream cancel unreachable or unsupported",
            });
            insert_audit_entry(pool, &audit).await?;
        }
    }

    Ok(outcome)
}
