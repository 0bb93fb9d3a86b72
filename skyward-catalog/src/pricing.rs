use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use skyward_core::flight::{Flight, SeatClass};
use skyward_core::{CoreError, CoreResult};

/// Fare rules applied to every booking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Fraction of the fare charged as tax (0.12 = 12%)
    pub tax_rate: Decimal,

    /// Flat fee per booking
    pub service_fee: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(12, 2),
            service_fee: Decimal::new(2500, 2),
        }
    }
}

/// Money breakdown stored on a booking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FareQuote {
    pub total_amount: Decimal,
    pub taxes: Decimal,
    pub service_fee: Decimal,
}

impl FareQuote {
    pub fn grand_total(&self) -> Decimal {
        self.total_amount + self.taxes + self.service_fee
    }
}

pub struct FareCalculator {
    config: PricingConfig,
}

impl FareCalculator {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Price `passengers` seats at `unit_price` each. Amounts are kept to cents.
    pub fn quote(&self, unit_price: Decimal, passengers: i32) -> CoreResult<FareQuote> {
        if passengers < 1 {
            return Err(CoreError::ValidationError(
                "At least one passenger is required".to_string(),
            ));
        }
        if unit_price.is_sign_negative() {
            return Err(CoreError::ValidationError(format!(
                "Fare cannot be negative: {}",
                unit_price
            )));
        }

        let total_amount = (unit_price * Decimal::from(passengers)).round_dp(2);
        let taxes = (total_amount * self.config.tax_rate).round_dp(2);

        Ok(FareQuote {
            total_amount,
            taxes,
            service_fee: self.config.service_fee.round_dp(2),
        })
    }

    /// Quote a trip: the unit price is the sum of every leg's class price.
    pub fn quote_trip(&self, legs: &[&Flight], class: SeatClass, passengers: i32) -> CoreResult<FareQuote> {
        let unit_price: Decimal = legs.iter().map(|flight| flight.unit_price(class)).sum();
        self.quote(unit_price, passengers)
    }
}

impl Default for FareCalculator {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use skyward_core::flight::{ClassCounts, FlightStatus};
    use uuid::Uuid;

    fn flight(economy: i64, business: i64) -> Flight {
        Flight {
            id: Uuid::new_v4(),
            flight_number: "SW101".to_string(),
            origin: "SIN".to_string(),
            destination: "BKK".to_string(),
            departure_time: Utc::now(),
            arrival_time: Utc::now(),
            status: FlightStatus::Scheduled,
            economy_price: Decimal::new(economy, 2),
            business_price: Decimal::new(business, 2),
            first_class_price: Decimal::ZERO,
            capacity: ClassCounts::new(100, 10, 0),
            available: ClassCounts::new(100, 10, 0),
        }
    }

    #[test]
    fn test_two_economy_seats() {
        let calculator = FareCalculator::default();
        let outbound = flight(10000, 50000);

        let quote = calculator.quote_trip(&[&outbound], SeatClass::Economy, 2).unwrap();

        assert_eq!(quote.total_amount, Decimal::new(20000, 2));
        assert_eq!(quote.taxes, Decimal::new(2400, 2));
        assert_eq!(quote.service_fee, Decimal::new(2500, 2));
        assert_eq!(quote.grand_total(), Decimal::new(24900, 2));
    }

    #[test]
    fn test_round_trip_sums_legs() {
        let calculator = FareCalculator::default();
        let outbound = flight(10000, 50000);
        let inbound = flight(8000, 40000);

        let quote = calculator.quote_trip(&[&outbound, &inbound], SeatClass::Business, 1).unwrap();
        assert_eq!(quote.total_amount, Decimal::new(90000, 2));
    }

    #[test]
    fn test_rejects_empty_booking() {
        let calculator = FareCalculator::default();
        assert!(matches!(
            calculator.quote(Decimal::new(10000, 2), 0),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_taxes_rounded_to_cents() {
        let calculator = FareCalculator::default();
        let quote = calculator.quote(Decimal::new(3333, 2), 1).unwrap();

        // 33.33 * 0.12 = 3.9996
        assert_eq!(quote.taxes, Decimal::new(400, 2));
    }

    proptest! {
        #[test]
        fn prop_grand_total_is_sum_of_parts(cents in 0i64..10_000_000, passengers in 1i32..10) {
            let calculator = FareCalculator::default();
            let quote = calculator.quote(Decimal::new(cents, 2), passengers).unwrap();

            prop_assert_eq!(quote.grand_total(), quote.total_amount + quote.taxes + quote.service_fee);
            prop_assert!(!quote.total_amount.is_sign_negative());
            prop_assert!(!quote.taxes.is_sign_negative());
        }
    }
}
