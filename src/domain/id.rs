use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::PaymentError;

/// Merchant order identifier (`EDU-xxx`) — the cross-gateway correlation key.
/// Generated once at purchase creation, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantOrderId(String);

impl MerchantOrderId {
    pub fn generate() -> Self {
        Self(format!("EDU-{}", Uuid::now_v7().simple()))
    }

    pub fn new(id: impl Into<String>) -> Result<Self, PaymentError> {
        let id = id.into();
        if !id.starts_with("EDU-") || id.len() <= 4 {
            return Err(PaymentError::Validation(format!(
                "MerchantOrderId must start with EDU-, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = MerchantOrderId::generate();
        let b = MerchantOrderId::generate();
        assert!(a.as_str().starts_with("EDU-"));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_foreign_prefix() {
        assert!(MerchantOrderId::new("ORD-123").is_err());
        assert!(MerchantOrderId::new("EDU-").is_err());
        assert!(MerchantOrderId::new("EDU-0123abc").is_ok());
    }
}
