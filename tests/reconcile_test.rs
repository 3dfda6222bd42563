mod common;

use common::*;
use chrono::{Duration, Utc};
use edu_pay::domain::gateway::Gateway;
use edu_pay::domain::item::extended_grant_expiry;
use edu_pay::domain::payment::AppliedOutcome;
use edu_pay::domain::status::{CanonicalStatus, IgnoreReason};
use edu_pay::infra::postgres::payment_repo;
use edu_pay::services::reconciliation::{apply_transition, cancel_purchase};

const DB: &str = "edu_pay_test_reconcile";

// ── happy path: midtrans capture+accept completes and grants ───────────────

#[tokio::test]
async fn completed_payment_grants_access() {
    let pool = setup_pool(DB).await;
    let record = seed_payment(&pool, 101, course(42), Gateway::Midtrans, 500_000, None).await;
    let order = record.merchant_order_id().as_str();

    let outcome = apply_transition(
        &pool,
        order,
        CanonicalStatus::Completed,
        Some("capture"),
        "webhook:midtrans",
    )
    .await
    .unwrap();

    assert!(matches!(
        outcome,
        AppliedOutcome::Applied {
            from: CanonicalStatus::Pending,
            to: CanonicalStatus::Completed,
        }
    ));

    let row = get_payment_row(&pool, order).await.unwrap();
    assert_eq!(row.status, "completed");
    assert_eq!(row.raw_gateway_status.as_deref(), Some("capture"));
    assert!(row.paid_at.is_some());

    assert_eq!(count_grants_for(&pool, 101, course(42)).await, 1);
    let grant = get_grant_row(&pool, 101, course(42)).await.unwrap();
    assert_eq!(grant.granted_via, Some(record.id()));
    assert_eq!(grant.expires_at, None); // no duration policy — perpetual
}

// ── idempotent webhook delivery ────────────────────────────────────────────

#[tokio::test]
async fn duplicate_completed_delivery_keeps_one_grant() {
    let pool = setup_pool(DB).await;
    let record = seed_payment(&pool, 102, course(7), Gateway::Midtrans, 150_000, Some(30)).await;
    let order = record.merchant_order_id().as_str();

    let first = apply_transition(&pool, order, CanonicalStatus::Completed, Some("settlement"), "webhook:midtrans")
        .await
        .unwrap();
    let second = apply_transition(&pool, order, CanonicalStatus::Completed, Some("settlement"), "webhook:midtrans")
        .await
        .unwrap();

    assert!(matches!(first, AppliedOutcome::Applied { .. }));
    assert_eq!(
        second,
        AppliedOutcome::Ignored(IgnoreReason::AlreadyTerminal)
    );

    let row = get_payment_row(&pool, order).await.unwrap();
    assert_eq!(row.status, "completed");
    assert_eq!(count_grants_for(&pool, 102, course(7)).await, 1);

    // Redelivery must not compound the 30-day window either.
    let grant = get_grant_row(&pool, 102, course(7)).await.unwrap();
    let paid_at = row.paid_at.unwrap();
    assert_eq!(grant.expires_at, Some(paid_at + Duration::days(30)));
}

// ── terminal immutability / out-of-order delivery ──────────────────────────

#[tokio::test]
async fn late_failed_webhook_cannot_overwrite_completed() {
    let pool = setup_pool(DB).await;
    let record = seed_payment(&pool, 103, course(8), Gateway::Midtrans, 90_000, None).await;
    let order = record.merchant_order_id().as_str();

    apply_transition(&pool, order, CanonicalStatus::Completed, Some("settlement"), "webhook:midtrans")
        .await
        .unwrap();

    for late in [CanonicalStatus::Failed, CanonicalStatus::Pending] {
        let outcome = apply_transition(&pool, order, late, Some("deny"), "webhook:midtrans")
            .await
            .unwrap();
        assert_eq!(outcome, AppliedOutcome::Ignored(IgnoreReason::AlreadyTerminal));
    }

    let row = get_payment_row(&pool, order).await.unwrap();
    assert_eq!(row.status, "completed");

    // The conflicting failed webhook is recorded, not applied.
    let actions = audit_actions(&pool, order).await;
    assert!(actions.iter().any(|a| a == "conflicting_notification"));
}

// ── gateway B decline ──────────────────────────────────────────────────────

#[tokio::test]
async fn duitku_decline_fails_without_grant() {
    let pool = setup_pool(DB).await;
    let record = seed_payment(&pool, 104, course(9), Gateway::Duitku, 75_000, Some(90)).await;
    let order = record.merchant_order_id().as_str();

    let outcome = apply_transition(&pool, order, CanonicalStatus::Failed, Some("02"), "webhook:duitku")
        .await
        .unwrap();
    assert!(matches!(outcome, AppliedOutcome::Applied { .. }));

    let row = get_payment_row(&pool, order).await.unwrap();
    assert_eq!(row.status, "failed");
    assert_eq!(row.raw_gateway_status.as_deref(), Some("02"));
    assert!(row.paid_at.is_none());
    assert_eq!(count_grants_for(&pool, 104, course(9)).await, 0);
}

// ── unrecognized vocabulary ────────────────────────────────────────────────

#[tokio::test]
async fn unknown_status_never_transitions() {
    let pool = setup_pool(DB).await;
    let record = seed_payment(&pool, 105, course(10), Gateway::Midtrans, 60_000, None).await;
    let order = record.merchant_order_id().as_str();

    let outcome = apply_transition(&pool, order, CanonicalStatus::Unknown, Some("refund"), "webhook:midtrans")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        AppliedOutcome::Ignored(IgnoreReason::UnrecognizedStatus)
    );

    let row = get_payment_row(&pool, order).await.unwrap();
    assert_eq!(row.status, "pending");
}

#[tokio::test]
async fn pending_notification_is_a_noop() {
    let pool = setup_pool(DB).await;
    let record = seed_payment(&pool, 106, course(11), Gateway::Duitku, 40_000, None).await;
    let order = record.merchant_order_id().as_str();

    let outcome = apply_transition(&pool, order, CanonicalStatus::Pending, Some("01"), "webhook:duitku")
        .await
        .unwrap();
    assert_eq!(outcome, AppliedOutcome::Ignored(IgnoreReason::NoChange));
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let pool = setup_pool(DB).await;
    let err = apply_transition(&pool, "EDU-missing", CanonicalStatus::Completed, None, "test")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        edu_pay::domain::error::PaymentError::NotFound(_)
    ));
}

// ── grant extension across payments ────────────────────────────────────────

#[tokio::test]
async fn second_payment_extends_grant_deterministically() {
    let pool = setup_pool(DB).await;
    let item = course(55);

    let first = seed_payment(&pool, 107, item, Gateway::Duitku, 200_000, Some(30)).await;
    apply_transition(&pool, first.merchant_order_id().as_str(), CanonicalStatus::Completed, Some("00"), "webhook:duitku")
        .await
        .unwrap();
    let first_expiry = get_grant_row(&pool, 107, item).await.unwrap().expires_at;

    let second = seed_payment(&pool, 107, item, Gateway::Duitku, 200_000, Some(30)).await;
    apply_transition(&pool, second.merchant_order_id().as_str(), CanonicalStatus::Completed, Some("00"), "webhook:duitku")
        .await
        .unwrap();

    // Still one grant row, now owned by the second payment.
    assert_eq!(count_grants_for(&pool, 107, item).await, 1);
    let grant = get_grant_row(&pool, 107, item).await.unwrap();
    let second_paid = get_payment_row(&pool, second.merchant_order_id().as_str())
        .await
        .unwrap()
        .paid_at
        .unwrap();
    assert_eq!(grant.granted_via, Some(second.id()));
    assert_eq!(
        grant.expires_at,
        extended_grant_expiry(first_expiry, second_paid, Some(30))
    );
}

// ── degraded local cancel ──────────────────────────────────────────────────

#[tokio::test]
async fn cancel_applies_locally_when_gateway_unreachable() {
    let pool = setup_pool(DB).await;
    let record = seed_payment(&pool, 108, course(12), Gateway::Duitku, 50_000, None).await;
    let order = record.merchant_order_id().as_str();

    let stub = StubGateway::failing_cancel(Gateway::Duitku);
    let outcome = cancel_purchase(&pool, &stub, &record).await.unwrap();
    assert!(matches!(
        outcome,
        AppliedOutcome::Applied {
            to: CanonicalStatus::Cancelled,
            ..
        }
    ));

    let row = get_payment_row(&pool, order).await.unwrap();
    assert_eq!(row.status, "cancelled");

    let actions = audit_actions(&pool, order).await;
    assert!(actions.iter().any(|a| a == "cancel_degraded"));
}

#[tokio::test]
async fn clean_cancel_is_not_marked_degraded() {
    let pool = setup_pool(DB).await;
    let record = seed_payment(&pool, 109, course(13), Gateway::Midtrans, 50_000, None).await;
    let order = record.merchant_order_id().as_str();

    let stub = StubGateway::new(Gateway::Midtrans);
    let outcome = cancel_purchase(&pool, &stub, &record).await.unwrap();
    assert!(matches!(outcome, AppliedOutcome::Applied { .. }));

    let actions = audit_actions(&pool, order).await;
    assert!(!actions.iter().any(|a| a == "cancel_degraded"));
}

// ── expiry: read-time consistency and best-effort sweep ────────────────────

#[tokio::test]
async fn overdue_pending_reads_as_expired_then_sweeps() {
    let pool = setup_pool(DB).await;
    let record = seed_expired_payment(&pool, 110, course(14), Gateway::Duitku, 30_000).await;
    let order = record.merchant_order_id().as_str();

    // Before any sweep, the read path already reports expired and the
    // duplicate guard no longer sees the record as payable.
    assert_eq!(record.effective_status(Utc::now()), CanonicalStatus::Expired);
    let payable = payment_repo::find_payable_pending(&pool, 110, course(14), Utc::now())
        .await
        .unwrap();
    assert!(payable.is_none());

    // The sweep persists the transition.
    let swept = payment_repo::sweep_expired(&pool, Utc::now()).await.unwrap();
    assert!(swept >= 1);
    let row = get_payment_row(&pool, order).await.unwrap();
    assert_eq!(row.status, "expired");

    // Terminal now — a late success webhook changes nothing.
    let outcome = apply_transition(&pool, order, CanonicalStatus::Completed, Some("00"), "webhook:duitku")
        .await
        .unwrap();
    assert_eq!(outcome, AppliedOutcome::Ignored(IgnoreReason::AlreadyTerminal));
}
