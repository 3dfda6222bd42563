//! Idempotent access granting, keyed on (user, item).
//!
//! Safe to call any number of times for one payment: a grant remembers the
//! payment that produced it (`granted_via`), so redelivered webhooks and
//! engine retries are no-ops instead of compounding extensions.

use {
    crate::domain::{
        access::GrantOutcome,
        audit::NewAuditEntry,
        error::PaymentError,
        item::{extended_grant_expiry, fresh_grant_expiry},
        payment::PaymentRecord,
        status::CanonicalStatus,
    },
    crate::infra::postgres::{access_repo, audit_repo::insert_audit_entry},
    sqlx::PgPool,
};

/// Create or extend the access grant for a completed payment.
pub async fn grant_for(
    pool: &PgPool,
    record: &PaymentRecord,
) -> Result<GrantOutcome, PaymentError> {
    if record.status() != CanonicalStatus::Completed {
        return Err(PaymentError::Validation(format!(
            "grant_for requires a completed payment, got {}",
            record.status()
        )));
    }
    // Completed records always carry paid_at; status_updated_at is the
    // fallback for rows written before that invariant held.
    let paid_at = record.paid_at().unwrap_or(record.status_updated_at());

    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    // Serialize grants per (user, item) — different payments for the same
    // pair must extend sequentially, not race.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("grant:{}:{}", record.user_id(), record.item()))
        .execute(&mut *tx)
        .await?;

    let existing = access_repo::find(&mut *tx, record.user_id(), record.item()).await?;

    let outcome = match existing {
        Some(grant) if grant.granted_via == Some(record.id()) => GrantOutcome::AlreadyGranted,
        Some(grant) => {
            let expires_at =
                extended_grant_expiry(grant.expires_at, paid_at, record.access_days());
            access_repo::refresh(&mut *tx, grant.id, record.id(), paid_at, expires_at).await?;
            GrantOutcome::Extended
        }
        None => {
            let expires_at = fresh_grant_expiry(paid_at, record.access_days());
            access_repo::insert(
                &mut *tx,
                record.user_id(),
                record.item(),
                record.id(),
                paid_at,
                expires_at,
            )
            .await?;
            GrantOutcome::Granted
        }
    };

    if outcome != GrantOutcome::AlreadyGranted {
        // The access-granted event: downstream catalog code consumes the
        // grant row and this audit entry; the core stops here.
        let mut audit = NewAuditEntry::payment(
            record.id(),
            record.merchant_order_id().as_str(),
            "access_granted",
            "access_grant",
        );
        audit.detail = serde_json::json!({
            "user_id": record.user_id(),
            "item": record.item().to_string(),
            "extended": outcome == GrantOutcome::Extended,
            "access_days": record.access_days(),
        });
        insert_audit_entry(&mut *tx, &audit).await?;
    }

    tx.commit().await?;

    tracing::info!(
        order_id = %record.merchant_order_id(),
        user_id = record.user_id(),
        item = %record.item(),
        ?outcome,
        "access grant processed"
    );

    Ok(outcome)
}
