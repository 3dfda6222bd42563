use chrono::{DateTime, Duration, Utc};
use edu_pay::domain::item::{extended_grant_expiry, fresh_grant_expiry};
use edu_pay::domain::status::{CanonicalStatus, IgnoreReason, TransitionDecision, decide};
use proptest::prelude::*;

fn arb_status() -> impl Strategy<Value = CanonicalStatus> {
    prop_oneof![
        Just(CanonicalStatus::Pending),
        Just(CanonicalStatus::Completed),
        Just(CanonicalStatus::Failed),
        Just(CanonicalStatus::Cancelled),
        Just(CanonicalStatus::Expired),
        Just(CanonicalStatus::Unknown),
    ]
}

fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> {
    // A century of seconds around 2000-01-01.
    (0i64..3_000_000_000).prop_map(|s| DateTime::from_timestamp(s, 0).unwrap())
}

proptest! {
    /// Terminal states never transition, whatever a later notification claims.
    #[test]
    fn terminal_states_reject_all_transitions(target in arb_status()) {
        use CanonicalStatus::*;
        for terminal in [Completed, Failed, Cancelled, Expired] {
            prop_assert_eq!(
                decide(terminal, target),
                TransitionDecision::Ignore(IgnoreReason::AlreadyTerminal)
            );
        }
    }

    /// Any random notification sequence starting from Pending applies at most
    /// one transition — every reachable target is terminal.
    #[test]
    fn random_walk_has_at_most_one_transition(
        steps in prop::collection::vec(arb_status(), 1..20)
    ) {
        let mut current = CanonicalStatus::Pending;
        let mut transitions = 0u32;
        for next in &steps {
            if let TransitionDecision::Apply = decide(current, *next) {
                current = *next;
                transitions += 1;
            }
        }
        prop_assert!(transitions <= 1, "got {transitions} transitions in walk: {steps:?}");
    }

    /// Unknown and Pending are never applied, from any starting state.
    #[test]
    fn unknown_and_pending_never_apply(current in arb_status()) {
        prop_assert_ne!(decide(current, CanonicalStatus::Unknown), TransitionDecision::Apply);
        prop_assert_ne!(decide(current, CanonicalStatus::Pending), TransitionDecision::Apply);
    }

    /// as_str → try_from roundtrip is identity for every stored status.
    #[test]
    fn stored_status_roundtrip(status in arb_status()) {
        match status {
            // Unknown is adapter-output-only and must not parse back.
            CanonicalStatus::Unknown => {
                prop_assert!(CanonicalStatus::try_from(status.as_str()).is_err());
            }
            other => {
                prop_assert_eq!(CanonicalStatus::try_from(other.as_str()).unwrap(), other);
            }
        }
    }

    /// Grant expiry math is deterministic and never shortens an active grant.
    #[test]
    fn extension_never_shortens_an_active_grant(
        paid in arb_instant(),
        current_offset in 0i64..365,
        days in 1i32..730,
    ) {
        let current = paid + Duration::days(current_offset);
        let extended = extended_grant_expiry(Some(current), paid, Some(days)).unwrap();
        prop_assert!(extended > current);
        prop_assert_eq!(extended, current.max(paid) + Duration::days(i64::from(days)));
    }

    /// A perpetual grant stays perpetual through any extension.
    #[test]
    fn perpetual_grants_stay_perpetual(paid in arb_instant(), days in proptest::option::of(1i32..730)) {
        prop_assert_eq!(extended_grant_expiry(None, paid, days), None);
    }

    /// Fresh grants anchor on paid_at, not on wall-clock now.
    #[test]
    fn fresh_grant_is_anchored_on_paid_at(paid in arb_instant(), days in 1i32..730) {
        prop_assert_eq!(
            fresh_grant_expiry(paid, Some(days)),
            Some(paid + Duration::days(i64::from(days)))
        );
    }
}
