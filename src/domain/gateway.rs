use {
    super::error::PaymentError,
    super::payment::PaymentRecord,
    super::status::CanonicalStatus,
    serde::{Deserialize, Serialize},
    std::fmt,
    std::{future::Future, pin::Pin},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    Midtrans,
    Duitku,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Midtrans => "midtrans",
            Self::Duitku => "duitku",
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Gateway {
    type Error = PaymentError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "midtrans" => Ok(Self::Midtrans),
            "duitku" => Ok(Self::Duitku),
            other => Err(PaymentError::Validation(format!("unknown gateway: {other}"))),
        }
    }
}

/// Customer identity passed explicitly from the caller — the core never
/// reads ambient request state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
}

/// What the gateway hands back when a checkout session is opened.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    /// Where to send the user's browser to pay.
    pub redirect_url: String,
    /// The gateway's own correlation id (Snap token / Duitku reference).
    pub gateway_ref: String,
}

/// Result of an active status poll.
#[derive(Debug, Clone)]
pub struct StatusProbe {
    pub status: CanonicalStatus,
    /// The gateway's own vocabulary term, kept for audit.
    pub raw: String,
}

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, PaymentError>> + Send + 'a>>;

/// One adapter per gateway family. The reconciliation engine only ever sees
/// `CanonicalStatus`; everything gateway-specific stays behind this trait.
///
/// Adapters are stateless given their credentials. Outbound calls carry a
/// timeout and report network/5xx failures as `GatewayUnreachable`
/// (retryable), never as an implicit status.
pub trait GatewayAdapter: Send + Sync {
    fn gateway(&self) -> Gateway;

    /// Open (or re-open) a checkout session for a still-pending record.
    /// Calling this twice for the same record must be harmless — it simply
    /// requests a fresh redirect target.
    fn create_checkout<'a>(
        &'a self,
        record: &'a PaymentRecord,
        customer: &'a Customer,
    ) -> BoxFut<'a, CheckoutSession>;

    /// Authenticate an inbound notification. Constant-time comparison;
    /// any missing field means reject.
    fn verify_notification(&self, payload: &serde_json::Value) -> bool;

    /// Map the gateway's status vocabulary to the canonical enum.
    /// Unrecognized vocabulary becomes `Unknown`, on which the engine
    /// never transitions.
    fn translate_status(&self, payload: &serde_json::Value) -> CanonicalStatus;

    /// Actively poll the gateway for the record's current status.
    fn check_status<'a>(&'a self, record: &'a PaymentRecord) -> BoxFut<'a, StatusProbe>;

    /// Ask the gateway to void the transaction upstream. Errors here do not
    /// block a local cancel — the engine records a degraded cancel instead.
    fn cancel<'a>(&'a self, record: &'a PaymentRecord) -> BoxFut<'a, ()>;
}
