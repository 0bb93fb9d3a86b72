use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use skyward_core::booking::{Booking, BookingStatus};
use skyward_core::clock::Clock;
use skyward_core::payment::{GatewayReceipt, Payment, PaymentGateway, PaymentMethod, PaymentStatus};
use skyward_core::repository::BookingRepository;
use skyward_core::{CoreError, CoreResult};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ledger::BookingLedger;

/// Records the single payment of a booking and confirms it
pub struct PaymentRecorder {
    bookings: Arc<dyn BookingRepository>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<BookingLedger>,
    clock: Arc<dyn Clock>,
}

impl PaymentRecorder {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<BookingLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            gateway,
            ledger,
            clock,
        }
    }

    pub async fn record(&self, booking: &Booking, method: PaymentMethod) -> CoreResult<(Booking, Payment)> {
        if self.bookings.find_payment(booking.id).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "Payment already recorded for booking {}",
                booking.reference
            )));
        }
        if !booking.status.can_transition_to(BookingStatus::Confirmed) {
            return Err(CoreError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Confirmed.to_string(),
            });
        }

        let amount = booking.grand_total();
        let now = self.clock.now();
        let receipt = self.gateway.charge(&booking.reference, amount, method, now).await?;

        if receipt.status != PaymentStatus::Completed {
            warn!("Payment for {} not completed: {}", booking.reference, receipt.response);
            return Err(CoreError::ValidationError(format!("Payment failed: {}", receipt.response)));
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            amount,
            method,
            status: receipt.status,
            transaction_id: receipt.transaction_id,
            gateway_response: receipt.response,
            created_at: now,
            processed_at: Some(now),
        };

        // The store rejects a second payment even if another request got past the check above
        let confirmed = self.ledger.confirm(booking, &payment).await?;

        info!(
            "Payment {} of {} via {} recorded for booking {}",
            payment.transaction_id,
            payment.amount,
            method.as_str(),
            confirmed.reference
        );
        Ok((confirmed, payment))
    }
}

/// Approves every charge. There is no real gateway behind it.
pub struct SimulatedGateway;

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(
        &self,
        reference: &str,
        amount: Decimal,
        method: PaymentMethod,
        at: DateTime<Utc>,
    ) -> CoreResult<GatewayReceipt> {
        Ok(GatewayReceipt {
            transaction_id: transaction_id(reference, at),
            status: PaymentStatus::Completed,
            response: format!("Simulated approval of {} via {}", amount, method.as_str()),
        })
    }
}

/// `TXN_{reference}_{YYYYmmddHHMMSS}`
pub fn transaction_id(reference: &str, at: DateTime<Utc>) -> String {
    format!("TXN_{}_{}", reference, at.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use chrono::TimeZone;

    struct DecliningGateway;

    #[async_trait]
    impl PaymentGateway for DecliningGateway {
        async fn charge(&self, reference: &str, _: Decimal, _: PaymentMethod, at: DateTime<Utc>) -> CoreResult<GatewayReceipt> {
            Ok(GatewayReceipt {
                transaction_id: transaction_id(reference, at),
                status: PaymentStatus::Failed,
                response: "Insufficient funds".to_string(),
            })
        }
    }

    #[test]
    fn test_transaction_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(transaction_id("K3M9QZ", at), "TXN_K3M9QZ_20240309140507");
    }

    #[tokio::test]
    async fn test_record_confirms_booking() {
        let fx = Fixture::new().await;
        let booking = fx.book(2).await;
        let before = fx.economy_available().await;

        let (confirmed, payment) = fx.payments.record(&booking, PaymentMethod::CreditCard).await.unwrap();

        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(payment.amount, booking.grand_total());
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.transaction_id.starts_with(&format!("TXN_{}_", booking.reference)));
        assert!(payment.processed_at.is_some());
        assert_eq!(fx.economy_available().await, before - 2);

        let stored = fx.ledger.payment(&confirmed).await.unwrap().unwrap();
        assert_eq!(stored.id, payment.id);
    }

    #[tokio::test]
    async fn test_second_payment_conflicts() {
        let fx = Fixture::new().await;
        let booking = fx.book(1).await;

        fx.payments.record(&booking, PaymentMethod::Paypal).await.unwrap();
        let again = fx.payments.record(&booking, PaymentMethod::Paypal).await;
        assert!(matches!(again, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_declined_payment_leaves_booking_pending() {
        let fx = Fixture::new().await;
        let recorder = PaymentRecorder::new(
            fx.store.clone(),
            Arc::new(DecliningGateway),
            fx.ledger.clone(),
            fx.clock.clone(),
        );
        let booking = fx.book(1).await;

        let result = recorder.record(&booking, PaymentMethod::DebitCard).await;
        assert!(matches!(result, Err(CoreError::ValidationError(_))));

        let reloaded = fx.ledger.find(&booking.reference, fx.user_id).await.unwrap();
        assert_eq!(reloaded.status, BookingStatus::Pending);
        assert!(fx.ledger.payment(&reloaded).await.unwrap().is_none());
    }
}
