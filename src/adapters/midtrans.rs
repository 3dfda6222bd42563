//! Midtrans ("Snap-style") gateway adapter.
//!
//! Checkout goes through the Snap API and returns a hosted redirect URL;
//! notifications are JSON webhooks signed with
//! SHA-512(order_id + status_code + gross_amount + server_key).

use {
    crate::domain::{
        error::PaymentError,
        gateway::{CheckoutSession, Customer, Gateway, GatewayAdapter, StatusProbe},
        payment::PaymentRecord,
        status::CanonicalStatus,
    },
    serde::Deserialize,
    sha2::{Digest, Sha512},
    std::{future::Future, pin::Pin},
    subtle::ConstantTimeEq,
};

pub struct MidtransAdapter {
    client: reqwest::Client,
    server_key: String,
    /// Core API base, e.g. https://api.sandbox.midtrans.com
    api_base: String,
    /// Snap base, e.g. https://app.sandbox.midtrans.com
    snap_base: String,
}

#[derive(Debug, Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

impl MidtransAdapter {
    pub fn new(
        client: reqwest::Client,
        server_key: impl Into<String>,
        api_base: impl Into<String>,
        snap_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            server_key: server_key.into(),
            api_base: api_base.into(),
            snap_base: snap_base.into(),
        }
    }

    fn expected_signature(&self, order_id: &str, status_code: &str, gross_amount: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(order_id.as_bytes());
        hasher.update(status_code.as_bytes());
        hasher.update(gross_amount.as_bytes());
        hasher.update(self.server_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn create_checkout_inner(
        &self,
        record: &PaymentRecord,
        customer: &Customer,
    ) -> Result<CheckoutSession, PaymentError> {
        let body = serde_json::json!({
            "transaction_details": {
                "order_id": record.merchant_order_id().as_str(),
                "gross_amount": record.amount(),
            },
            "customer_details": {
                "first_name": customer.name,
                "email": customer.email,
            },
            "expiry": { "unit": "hours", "duration": 24 },
        });

        let resp = self
            .client
            .post(format!("{}/snap/v1/transactions", self.snap_base))
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("midtrans snap: {e}")))?;

        if !resp.status().is_success() {
            return Err(PaymentError::GatewayUnreachable(format!(
                "midtrans snap returned {}",
                resp.status()
            )));
        }

        let snap: SnapResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("midtrans snap body: {e}")))?;

        Ok(CheckoutSession {
            redirect_url: snap.redirect_url,
            gateway_ref: snap.token,
        })
    }

    async fn check_status_inner(&self, record: &PaymentRecord) -> Result<StatusProbe, PaymentError> {
        let resp = self
            .client
            .get(format!(
                "{}/v2/{}/status",
                self.api_base,
                record.merchant_order_id()
            ))
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("midtrans status: {e}")))?;

        if !resp.status().is_success() {
            return Err(PaymentError::GatewayUnreachable(format!(
                "midtrans status returned {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("midtrans status body: {e}")))?;

        let raw = body
            .get("transaction_status")
            .and_then(|v| v.as_str())
            .unwrap_or("absent")
            .to_string();

        Ok(StatusProbe {
            status: translate(&body),
            raw,
        })
    }

    async fn cancel_inner(&self, record: &PaymentRecord) -> Result<(), PaymentError> {
        let resp = self
            .client
            .post(format!(
                "{}/v2/{}/cancel",
                self.api_base,
                record.merchant_order_id()
            ))
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("midtrans cancel: {e}")))?;

        if !resp.status().is_success() {
            return Err(PaymentError::GatewayUnreachable(format!(
                "midtrans cancel returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Map Midtrans vocabulary onto the canonical enum. `capture` only counts as
/// completed when the fraud check accepted it (or was absent); anything the
/// mapping does not recognize becomes `Unknown`, which the engine ignores.
fn translate(payload: &serde_json::Value) -> CanonicalStatus {
    let transaction_status = payload.get("transaction_status").and_then(|v| v.as_str());
    let fraud_status = payload.get("fraud_status").and_then(|v| v.as_str());

    match transaction_status {
        Some("capture") => match fraud_status {
            Some("accept") | None => CanonicalStatus::Completed,
            _ => CanonicalStatus::Unknown,
        },
        Some("settlement") => CanonicalStatus::Completed,
        Some("pending") => CanonicalStatus::Pending,
        Some("deny") | Some("cancel") | Some("expire") | Some("failure") => CanonicalStatus::Failed,
        _ => CanonicalStatus::Unknown,
    }
}

impl GatewayAdapter for MidtransAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::Midtrans
    }

    fn create_checkout<'a>(
        &'a self,
        record: &'a PaymentRecord,
        customer: &'a Customer,
    ) -> Pin<Box<dyn Future<Output = Result<CheckoutSession, PaymentError>> + Send + 'a>> {
        Box::pin(self.create_checkout_inner(record, customer))
    }

    fn verify_notification(&self, payload: &serde_json::Value) -> bool {
        // Fail closed: every signed field must be present as a string.
        let (Some(order_id), Some(status_code), Some(gross_amount), Some(signature_key)) = (
            payload.get("order_id").and_then(|v| v.as_str()),
            payload.get("status_code").and_then(|v| v.as_str()),
            payload.get("gross_amount").and_then(|v| v.as_str()),
            payload.get("signature_key").and_then(|v| v.as_str()),
        ) else {
            return false;
        };

        let expected = self.expected_signature(order_id, status_code, gross_amount);
        let given = signature_key.to_ascii_lowercase();
        expected.as_bytes().ct_eq(given.as_bytes()).into()
    }

    fn translate_status(&self, payload: &serde_json::Value) -> CanonicalStatus {
        translate(payload)
    }

    fn check_status<'a>(
        &'a self,
        record: &'a PaymentRecord,
    ) -> Pin<Box<dyn Future<Output = Result<StatusProbe, PaymentError>> + Send + 'a>> {
        Box::pin(self.check_status_inner(record))
    }

    fn cancel<'a>(
        &'a self,
        record: &'a PaymentRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), PaymentError>> + Send + 'a>> {
        Box::pin(self.cancel_inner(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> MidtransAdapter {
        MidtransAdapter::new(
            reqwest::Client::new(),
            "SB-server-key",
            "https://api.test",
            "https://app.test",
        )
    }

    fn signed_payload(adapter: &MidtransAdapter, order_id: &str, amount: &str) -> serde_json::Value {
        let sig = adapter.expected_signature(order_id, "200", amount);
        serde_json::json!({
            "order_id": order_id,
            "status_code": "200",
            "gross_amount": amount,
            "transaction_status": "settlement",
            "transaction_id": "mt-1",
            "signature_key": sig,
        })
    }

    #[test]
    fn accepts_a_correctly_signed_payload() {
        let a = adapter();
        let payload = signed_payload(&a, "EDU-1", "500000.00");
        assert!(a.verify_notification(&payload));
    }

    #[test]
    fn rejects_a_tampered_amount() {
        let a = adapter();
        let mut payload = signed_payload(&a, "EDU-1", "500000.00");
        payload["gross_amount"] = serde_json::json!("1.00");
        assert!(!a.verify_notification(&payload));
    }

    #[test]
    fn rejects_when_any_signed_field_is_missing() {
        let a = adapter();
        for field in ["order_id", "status_code", "gross_amount", "signature_key"] {
            let mut payload = signed_payload(&a, "EDU-1", "500000.00");
            payload.as_object_mut().unwrap().remove(field);
            assert!(!a.verify_notification(&payload), "missing {field}");
        }
    }

    #[test]
    fn accepts_uppercase_hex_signatures() {
        let a = adapter();
        let mut payload = signed_payload(&a, "EDU-1", "500000.00");
        let upper = payload["signature_key"].as_str().unwrap().to_uppercase();
        payload["signature_key"] = serde_json::json!(upper);
        assert!(a.verify_notification(&payload));
    }

    #[test]
    fn capture_completed_only_when_fraud_accepts() {
        let accept = serde_json::json!({"transaction_status": "capture", "fraud_status": "accept"});
        let absent = serde_json::json!({"transaction_status": "capture"});
        let challenge =
            serde_json::json!({"transaction_status": "capture", "fraud_status": "challenge"});
        assert_eq!(translate(&accept), CanonicalStatus::Completed);
        assert_eq!(translate(&absent), CanonicalStatus::Completed);
        assert_eq!(translate(&challenge), CanonicalStatus::Unknown);
    }

    #[test]
    fn vocabulary_mapping() {
        let cases = [
            ("settlement", CanonicalStatus::Completed),
            ("pending", CanonicalStatus::Pending),
            ("deny", CanonicalStatus::Failed),
            ("cancel", CanonicalStatus::Failed),
            ("expire", CanonicalStatus::Failed),
            ("failure", CanonicalStatus::Failed),
            ("refund", CanonicalStatus::Unknown),
        ];
        for (raw, want) in cases {
            let payload = serde_json::json!({"transaction_status": raw});
            assert_eq!(translate(&payload), want, "{raw}");
        }
        assert_eq!(translate(&serde_json::json!({})), CanonicalStatus::Unknown);
    }
}
