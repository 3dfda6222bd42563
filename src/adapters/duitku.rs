//! Duitku ("Invoice-style") gateway adapter.
//!
//! Checkout goes through the merchant inquiry API, which issues a payment
//! URL plus an invoice reference; callbacks are form posts signed with
//! MD5(merchantCode + amount + merchantOrderId + apiKey).

use {
    crate::domain::{
        error::PaymentError,
        gateway::{CheckoutSession, Customer, Gateway, GatewayAdapter, StatusProbe},
        payment::PaymentRecord,
        status::CanonicalStatus,
    },
    md5::{Digest, Md5},
    serde::Deserialize,
    std::{future::Future, pin::Pin},
    subtle::ConstantTimeEq,
};

pub struct DuitkuAdapter {
    client: reqwest::Client,
    merchant_code: String,
    api_key: String,
    /// e.g. https://sandbox.duitku.com
    api_base: String,
    callback_url: String,
    return_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InquiryResponse {
    reference: String,
    payment_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionStatusResponse {
    status_code: Option<String>,
}

fn md5_hex(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for p in parts {
        hasher.update(p.as_bytes());
    }
    hex::encode(hasher.finalize())
}

impl DuitkuAdapter {
    pub fn new(
        client: reqwest::Client,
        merchant_code: impl Into<String>,
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        callback_url: impl Into<String>,
        return_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            merchant_code: merchant_code.into(),
            api_key: api_key.into(),
            api_base: api_base.into(),
            callback_url: callback_url.into(),
            return_url: return_url.into(),
        }
    }

    fn callback_signature(&self, amount: &str, merchant_order_id: &str) -> String {
        md5_hex(&[&self.merchant_code, amount, merchant_order_id, &self.api_key])
    }

    async fn create_checkout_inner(
        &self,
        record: &PaymentRecord,
        customer: &Customer,
    ) -> Result<CheckoutSession, PaymentError> {
        let amount = record.amount().to_string();
        let order_id = record.merchant_order_id().as_str();
        let signature = md5_hex(&[&self.merchant_code, order_id, &amount, &self.api_key]);

        let body = serde_json::json!({
            "merchantCode": self.merchant_code,
            "merchantOrderId": order_id,
            "paymentAmount": record.amount(),
            "productDetails": record.item().to_string(),
            "customerVaName": customer.name,
            "email": customer.email,
            "callbackUrl": self.callback_url,
            "returnUrl": self.return_url,
            "expiryPeriod": 1440,
            "signature": signature,
        });

        let resp = self
            .client
            .post(format!(
                "{}/webapi/api/merchant/v2/inquiry",
                self.api_base
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("duitku inquiry: {e}")))?;

        if !resp.status().is_success() {
            return Err(PaymentError::GatewayUnreachable(format!(
                "duitku inquiry returned {}",
                resp.status()
            )));
        }

        let invoice: InquiryResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("duitku inquiry body: {e}")))?;

        Ok(CheckoutSession {
            redirect_url: invoice.payment_url,
            gateway_ref: invoice.reference,
        })
    }

    async fn check_status_inner(&self, record: &PaymentRecord) -> Result<StatusProbe, PaymentError> {
        let order_id = record.merchant_order_id().as_str();
        let signature = md5_hex(&[&self.merchant_code, order_id, &self.api_key]);

        let body = serde_json::json!({
            "merchantCode": self.merchant_code,
            "merchantOrderId": order_id,
            "signature": signature,
        });

        let resp = self
            .client
            .post(format!(
                "{}/webapi/api/merchant/transactionStatus",
                self.api_base
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("duitku status: {e}")))?;

        if !resp.status().is_success() {
            return Err(PaymentError::GatewayUnreachable(format!(
                "duitku status returned {}",
                resp.status()
            )));
        }

        let status: TransactionStatusResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::GatewayUnreachable(format!("duitku status body: {e}")))?;

        let raw = status.status_code.unwrap_or_else(|| "absent".to_string());
        Ok(StatusProbe {
            status: translate_code(&raw),
            raw,
        })
    }
}

fn translate_code(code: &str) -> CanonicalStatus {
    match code {
        "00" => CanonicalStatus::Completed,
        "01" => CanonicalStatus::Pending,
        "02" => CanonicalStatus::Failed,
        _ => CanonicalStatus::Unknown,
    }
}

impl GatewayAdapter for DuitkuAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::Duitku
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
        let (Some(merchant_code), Some(amount), Some(order_id), Some(signature)) = (
            payload.get("merchantCode").and_then(|v| v.as_str()),
            payload.get("amount").and_then(|v| v.as_str()),
            payload.get("merchantOrderId").and_then(|v| v.as_str()),
            payload.get("signature").and_then(|v| v.as_str()),
        ) else {
            return false;
        };

        // A callback claiming a foreign merchant code can never verify.
        if merchant_code != self.merchant_code {
            return false;
        }

        let expected = self.callback_signature(amount, order_id);
        let given = signature.to_ascii_lowercase();
        expected.as_bytes().ct_eq(given.as_bytes()).into()
    }

    fn translate_status(&self, payload: &serde_json::Value) -> CanonicalStatus {
        match payload.get("resultCode").and_then(|v| v.as_str()) {
            Some(code) => translate_code(code),
            None => CanonicalStatus::Unknown,
        }
    }

    fn check_status<'a>(
        &'a self,
        record: &'a PaymentRecord,
    ) -> Pin<Box<dyn Future<Output = Result<StatusProbe, PaymentError>> + Send + 'a>> {
        Box::pin(self.check_status_inner(record))
    }

    /// Duitku exposes no merchant-side cancel API. Reporting it as
    /// unreachable lets the engine fall back to a recorded local cancel.
    fn cancel<'a>(
        &'a self,
        _record: &'a PaymentRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), PaymentError>> + Send + 'a>> {
        Box::pin(async {
            Err(PaymentError::GatewayUnreachable(
                "duitku has no upstream cancel".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> DuitkuAdapter {
        DuitkuAdapter::new(
            reqwest::Client::new(),
            "D0001",
            "api-key-secret",
            "https://sandbox.test",
            "https://platform.test/webhooks/duitku",
            "https://platform.test/payments/duitku/return",
        )
    }

    fn signed_callback(a: &DuitkuAdapter, order_id: &str, amount: &str, result: &str) -> serde_json::Value {
        serde_json::json!({
            "merchantCode": "D0001",
            "amount": amount,
            "merchantOrderId": order_id,
            "resultCode": result,
            "reference": "DK-REF-1",
            "signature": a.callback_signature(amount, order_id),
        })
    }

    #[test]
    fn accepts_a_correctly_signed_callback() {
        let a = adapter();
        let payload = signed_callback(&a, "EDU-9", "75000", "00");
        assert!(a.verify_notification(&payload));
    }

    #[test]
    fn rejects_a_tampered_amount() {
        let a = adapter();
        let mut payload = signed_callback(&a, "EDU-9", "75000", "00");
        payload["amount"] = serde_json::json!("1");
        assert!(!a.verify_notification(&payload));
    }

    #[test]
    fn rejects_a_foreign_merchant_code() {
        let a = adapter();
        let mut payload = signed_callback(&a, "EDU-9", "75000", "00");
        payload["merchantCode"] = serde_json::json!("D9999");
        assert!(!a.verify_notification(&payload));
    }

    #[test]
    fn rejects_when_any_signed_field_is_missing() {
        let a = adapter();
        for field in ["merchantCode", "amount", "merchantOrderId", "signature"] {
            let mut payload = signed_callback(&a, "EDU-9", "75000", "00");
            payload.as_object_mut().unwrap().remove(field);
            assert!(!a.verify_notification(&payload), "missing {field}");
        }
    }

    #[test]
    fn result_code_mapping() {
        let a = adapter();
        let cases = [
            ("00", CanonicalStatus::Completed),
            ("01", CanonicalStatus::Pending),
            ("02", CanonicalStatus::Failed),
            ("99", CanonicalStatus::Unknown),
        ];
        for (code, want) in cases {
            let payload = serde_json::json!({"resultCode": code});
            assert_eq!(a.translate_status(&payload), want, "{code}");
        }
        assert_eq!(
            a.translate_status(&serde_json::json!({})),
            CanonicalStatus::Unknown
        );
    }
}
