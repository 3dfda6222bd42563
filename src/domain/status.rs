use {
    super::error::PaymentError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Gateway-agnostic payment status. This is the only vocabulary the
/// reconciliation engine ever sees; adapters translate into it.
///
/// `Unknown` is an adapter output only — it is never persisted and the
/// engine never transitions on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Unknown,
}

impl CanonicalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }

    /// Terminal states admit no further transitions, regardless of what a
    /// late webhook claims.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired
        )
    }

    pub fn can_transition_to(&self, next: &CanonicalStatus) -> bool {
        matches!(decide(*self, *next), TransitionDecision::Apply)
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CanonicalStatus {
    type Error = PaymentError;

    /// Parses stored statuses. `unknown` is deliberately not accepted —
    /// it must never reach the database.
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(PaymentError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Why a transition was not applied. These are normal outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    AlreadyTerminal,
    UnrecognizedStatus,
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    Apply,
    Ignore(IgnoreReason),
}

/// Pure transition function of the state machine. The reconciliation engine
/// wraps this with the durable compare-and-set; keeping the decision pure
/// lets it be tested without a store.
pub fn decide(current: CanonicalStatus, incoming: CanonicalStatus) -> TransitionDecision {
    if current.is_terminal() {
        return TransitionDecision::Ignore(IgnoreReason::AlreadyTerminal);
    }
    match incoming {
        CanonicalStatus::Unknown => TransitionDecision::Ignore(IgnoreReason::UnrecognizedStatus),
        CanonicalStatus::Pending => TransitionDecision::Ignore(IgnoreReason::NoChange),
        _ => TransitionDecision::Apply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CanonicalStatus::*;

    const TERMINAL: [CanonicalStatus; 4] = [Completed, Failed, Cancelled, Expired];
    const ALL: [CanonicalStatus; 6] = [Pending, Completed, Failed, Cancelled, Expired, Unknown];

    #[test]
    fn pending_reaches_every_terminal_state() {
        for target in TERMINAL {
            assert_eq!(decide(Pending, target), TransitionDecision::Apply);
        }
    }

    #[test]
    fn terminal_states_ignore_everything() {
        for current in TERMINAL {
            for incoming in ALL {
                assert_eq!(
                    decide(current, incoming),
                    TransitionDecision::Ignore(IgnoreReason::AlreadyTerminal),
                    "{current} should ignore {incoming}"
                );
            }
        }
    }

    #[test]
    fn unknown_never_transitions() {
        assert_eq!(
            decide(Pending, Unknown),
            TransitionDecision::Ignore(IgnoreReason::UnrecognizedStatus)
        );
    }

    #[test]
    fn pending_to_pending_is_a_noop() {
        assert_eq!(
            decide(Pending, Pending),
            TransitionDecision::Ignore(IgnoreReason::NoChange)
        );
    }

    #[test]
    fn stored_status_roundtrip() {
        for s in [Pending, Completed, Failed, Cancelled, Expired] {
            assert_eq!(CanonicalStatus::try_from(s.as_str()).unwrap(), s);
        }
        assert!(CanonicalStatus::try_from("unknown").is_err());
        assert!(CanonicalStatus::try_from("settlement").is_err());
    }
}
