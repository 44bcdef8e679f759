use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

use transix_domain::{CardDetails, PaymentMethod};

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    Approved { reference: String },
    Declined { reason: String },
}

/// External settlement capability, invoked synchronously during reservation
/// finalization. A decline is a normal outcome; only transport failures
/// surface as errors.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn attempt(
        &self,
        amount: i32,
        currency: &str,
        method: PaymentMethod,
        card: &CardDetails,
    ) -> Result<PaymentOutcome, EngineError>;
}

const DECLINE_REASONS: [&str; 4] = [
    "card limit exceeded",
    "card details invalid",
    "issuer connection error",
    "transaction declined",
];

/// Stand-in gateway with a configurable approval rate. Amounts and card
/// details are accepted as-is; real acquirer rules live behind the trait.
pub struct SimulatedPaymentGateway {
    success_rate: f64,
}

impl SimulatedPaymentGateway {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }

    pub fn always_approve() -> Self {
        Self::new(1.0)
    }

    pub fn always_decline() -> Self {
        Self::new(0.0)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn attempt(
        &self,
        amount: i32,
        currency: &str,
        _method: PaymentMethod,
        _card: &CardDetails,
    ) -> Result<PaymentOutcome, EngineError> {
        let roll: f64 = rand::thread_rng().gen();
        if roll < self.success_rate {
            let hex = Uuid::new_v4().simple().to_string();
            let reference = format!("TXN_{}", hex[..12].to_uppercase());
            tracing::info!(amount, currency, %reference, "simulated settlement approved");
            Ok(PaymentOutcome::Approved { reference })
        } else {
            let reason =
                DECLINE_REASONS[rand::thread_rng().gen_range(0..DECLINE_REASONS.len())].to_string();
            tracing::info!(amount, currency, %reason, "simulated settlement declined");
            Ok(PaymentOutcome::Declined { reason })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> CardDetails {
        CardDetails {
            card_number: "4111111111111111".into(),
            card_name: "A TRAVELLER".into(),
            expiry: "12/29".into(),
            cvv: "123".into(),
        }
    }

    #[tokio::test]
    async fn forced_approval_carries_a_reference() {
        let gateway = SimulatedPaymentGateway::always_approve();
        match gateway
            .attempt(15000, "USD", PaymentMethod::CreditCard, &card())
            .await
            .unwrap()
        {
            PaymentOutcome::Approved { reference } => {
                assert!(reference.starts_with("TXN_"));
                assert_eq!(reference.len(), "TXN_".len() + 12);
            }
            PaymentOutcome::Declined { .. } => panic!("forced approval declined"),
        }
    }

    #[tokio::test]
    async fn forced_decline_names_a_reason() {
        let gateway = SimulatedPaymentGateway::always_decline();
        match gateway
            .attempt(15000, "USD", PaymentMethod::DebitCard, &card())
            .await
            .unwrap()
        {
            PaymentOutcome::Declined { reason } => assert!(!reason.is_empty()),
            PaymentOutcome::Approved { .. } => panic!("forced decline approved"),
        }
    }
}
