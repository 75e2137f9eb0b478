//! Payment provider contract.
//!
//! The engine never speaks a gateway wire format. It asks a
//! [`PaymentProvider`] for an opaque handle the client uses to pay, and is
//! later told (by the caller) that the payment for an order number
//! succeeded.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::signing::format_amount;
use crate::types::{Money, Timestamp};

/// Length of the random nonce in mock payment parameters.
const NONCE_LENGTH: usize = 22;

/// What the engine asks the provider to collect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    /// The order number the provider reports back against.
    pub out_trade_no: String,
    pub amount: Money,
    /// Identity of the payer as the provider knows it.
    pub payer: String,
    pub description: String,
}

/// Opaque handle returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentHandle {
    pub out_trade_no: String,
    pub params: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider rejected request: {0}")]
    Rejected(String),

    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Open a payment for `request` and return the client-facing handle.
    async fn create_payment(
        &self,
        request: &PaymentRequest,
        at: Timestamp,
    ) -> Result<PaymentHandle, PaymentError>;
}

/// Provider used until a real gateway is wired in. Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPaymentProvider;

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_payment(
        &self,
        request: &PaymentRequest,
        at: Timestamp,
    ) -> Result<PaymentHandle, PaymentError> {
        let nonce: String = rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(NONCE_LENGTH)
            .map(char::from)
            .collect();

        tracing::warn!(
            out_trade_no = %request.out_trade_no,
            "Returning mock payment parameters"
        );

        Ok(PaymentHandle {
            out_trade_no: request.out_trade_no.clone(),
            params: json!({
                "timeStamp": at.timestamp().to_string(),
                "nonceStr": nonce,
                "package": format!("prepay_id=mock_{}", request.out_trade_no),
                "signType": "RSA",
                "paySign": format!("mock_sign_{}", at.timestamp_millis()),
                "outTradeNo": request.out_trade_no,
                "totalAmount": format_amount(request.amount),
            }),
        })
    }
}
