use crate::domain::payment::Checkout;
use crate::domain::ports::{GatewayCallback, GatewayRequest, PaymentGateway};
use crate::error::{RentalError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

pub const SANDBOX_SECRET: &str = "sandbox-callback-secret";

/// Offline stand-in for the wallet provider.
///
/// Hands out deterministic checkout links derived from the order reference and
/// records every request it sees. `fail_next` makes the next calls fail with a
/// gateway error, for exercising the retry path. Callbacks are signed and
/// verified with HMAC-SHA256 under a shared secret, as the live provider does.
#[derive(Clone)]
pub struct SandboxGateway {
    base_url: String,
    secret: Arc<[u8]>,
    failures_left: Arc<AtomicU32>,
    requests: Arc<RwLock<Vec<GatewayRequest>>>,
}

impl SandboxGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            secret: Arc::from(SANDBOX_SECRET.as_bytes()),
            failures_left: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.secret = Arc::from(secret.as_ref());
        self
    }

    /// Signs `callback` the way the provider would before delivering it.
    pub fn sign(&self, mut callback: GatewayCallback) -> Result<GatewayCallback> {
        let mac = self.mac(&callback)?;
        callback.signature = hex::encode(mac.finalize().into_bytes());
        Ok(callback)
    }

    fn mac(&self, callback: &GatewayCallback) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| RentalError::Gateway(format!("invalid callback secret: {e}")))?;
        mac.update(callback.signing_payload().as_bytes());
        Ok(mac)
    }

    pub fn fail_next(&self, times: u32) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub async fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.read().await.clone()
    }
}

impl Default for SandboxGateway {
    fn default() -> Self {
        Self::new("https://sandbox.wallet.local/pay")
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn initiate(&self, request: GatewayRequest) -> Result<Checkout> {
        self.requests.write().await.push(request.clone());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RentalError::Gateway(format!(
                "provider unavailable for order {}",
                request.order_ref
            )));
        }

        Ok(Checkout {
            provider_order_id: format!("SBX-{}", request.order_ref),
            pay_url: format!(
                "{}?order={}&amount={}",
                self.base_url, request.order_ref, request.amount
            ),
            qr_ref: format!("qr:{}", request.order_ref),
        })
    }

    fn verify(&self, callback: &GatewayCallback) -> Result<()> {
        let rejected = || {
            RentalError::Gateway(format!(
                "callback for order {} failed signature verification",
                callback.order_ref
            ))
        };
        let signature = hex::decode(&callback.signature).map_err(|_| rejected())?;
        self.mac(callback)?
            .verify_slice(&signature)
            .map_err(|_| rejected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::payment::PaymentPurpose;
    use rust_decimal_macros::dec;

    fn request() -> GatewayRequest {
        GatewayRequest {
            order_ref: "BK1-DEP".into(),
            amount: Money::new(dec!(5000000)),
            purpose: PaymentPurpose::Deposit,
            description: "deposit BK1".into(),
        }
    }

    #[tokio::test]
    async fn test_checkout_is_derived_from_order_ref() {
        let gateway = SandboxGateway::new("https://pay.test");
        let checkout = gateway.initiate(request()).await.unwrap();
        assert_eq!(checkout.provider_order_id, "SBX-BK1-DEP");
        assert_eq!(
            checkout.pay_url,
            "https://pay.test?order=BK1-DEP&amount=5000000"
        );
        assert_eq!(gateway.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_next() {
        let gateway = SandboxGateway::default();
        gateway.fail_next(1);
        assert!(matches!(
            gateway.initiate(request()).await,
            Err(RentalError::Gateway(_))
        ));
        assert!(gateway.initiate(request()).await.is_ok());
    }

    fn callback() -> GatewayCallback {
        GatewayCallback {
            order_ref: "BK1-DEP".into(),
            transaction_id: "MOMO-1".into(),
            result_code: 0,
            message: Some("Successful.".into()),
            signature: String::new(),
        }
    }

    #[test]
    fn test_signed_callback_verifies() {
        let gateway = SandboxGateway::default();
        let signed = gateway.sign(callback()).unwrap();
        assert_eq!(signed.signature.len(), 64);
        assert!(gateway.verify(&signed).is_ok());
    }

    #[test]
    fn test_tampered_or_foreign_callbacks_are_rejected() {
        let gateway = SandboxGateway::default();
        let signed = gateway.sign(callback()).unwrap();

        let mut tampered = signed.clone();
        tampered.result_code = 1006;
        assert!(matches!(gateway.verify(&tampered), Err(RentalError::Gateway(_))));

        let unsigned = callback();
        assert!(matches!(gateway.verify(&unsigned), Err(RentalError::Gateway(_))));

        let mut garbage = signed.clone();
        garbage.signature = "not-hex".into();
        assert!(matches!(gateway.verify(&garbage), Err(RentalError::Gateway(_))));

        let other = SandboxGateway::default().with_secret("another-secret");
        assert!(matches!(other.verify(&signed), Err(RentalError::Gateway(_))));
    }
}
