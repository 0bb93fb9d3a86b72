use chrono::Duration;
use skyward_booking::{
    BookingLedger, PassengerDrafts, PaymentRecorder, ReferenceGenerator, SeatAllocator, SeatEvents,
    SimulatedGateway,
};
use skyward_catalog::{FareCalculator, PricingConfig};
use skyward_core::clock::Clock;
use skyward_core::repository::{BookingRepository, FlightRepository, FlowStore, OtpRepository, UserRepository};
use skyward_identity::{AccountService, AccountSettings, OtpVerifier};
use skyward_shared::SeatEvent;
use skyward_store::app_config::BusinessRules;
use skyward_store::MemoryStore;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    /// Echo OTP codes back to the client. Development only.
    pub expose_otp: bool,
    pub password_hash_cost: u32,
}

/// Storage behind the services, Postgres/Redis in production or one `MemoryStore`
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub otps: Arc<dyn OtpRepository>,
    pub flights: Arc<dyn FlightRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub flows: Arc<dyn FlowStore>,
}

impl Repositories {
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            otps: store.clone(),
            flights: store.clone(),
            bookings: store.clone(),
            flows: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub ledger: Arc<BookingLedger>,
    pub seats: Arc<SeatAllocator>,
    pub payments: Arc<PaymentRecorder>,
    pub drafts: Arc<PassengerDrafts>,
    pub sse_tx: broadcast::Sender<SeatEvent>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>, rules: &BusinessRules, auth: AuthConfig) -> Self {
        let (sse_tx, _) = broadcast::channel(100);
        let events = SeatEvents::new(sse_tx.clone());
        let flow_ttl = Duration::seconds(rules.flow_ttl_seconds as i64);

        let accounts = AccountService::new(
            repos.users,
            repos.flows.clone(),
            OtpVerifier::new(repos.otps, clock.clone()),
            clock.clone(),
            AccountSettings {
                otp_ttl: Duration::seconds(rules.otp_ttl_seconds as i64),
                flow_ttl,
                password_hash_cost: auth.password_hash_cost,
            },
        );

        let fares = FareCalculator::new(PricingConfig {
            tax_rate: rules.tax_rate,
            service_fee: rules.service_fee,
        });
        let ledger = Arc::new(
            BookingLedger::new(
                repos.bookings.clone(),
                repos.flights.clone(),
                fares,
                ReferenceGenerator::new(repos.bookings.clone()),
                clock.clone(),
            )
            .with_events(events.clone()),
        );

        let seats = SeatAllocator::new(repos.bookings.clone(), repos.flights, clock.clone()).with_events(events);
        let payments = PaymentRecorder::new(repos.bookings, Arc::new(SimulatedGateway), ledger.clone(), clock.clone());
        let drafts = PassengerDrafts::new(repos.flows, clock, flow_ttl);

        Self {
            accounts: Arc::new(accounts),
            ledger,
            seats: Arc::new(seats),
            payments: Arc::new(payments),
            drafts: Arc::new(drafts),
            sse_tx,
            auth,
        }
    }
}
