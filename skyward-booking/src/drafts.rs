use chrono::Duration;
use skyward_core::booking::PassengerDetails;
use skyward_core::clock::Clock;
use skyward_core::identity::{FlowKind, FlowToken};
use skyward_core::repository::FlowStore;
use skyward_core::{CoreError, CoreResult};
use std::sync::Arc;
use tracing::debug;

/// Passenger data captured at booking time, parked until the details step.
pub struct PassengerDrafts {
    flows: Arc<dyn FlowStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PassengerDrafts {
    pub fn new(flows: Arc<dyn FlowStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { flows, clock, ttl }
    }

    /// Returns the token the details step must present.
    pub async fn stash(&self, reference: &str, passengers: &[PassengerDetails]) -> CoreResult<String> {
        let payload = serde_json::to_value(passengers)
            .map_err(|e| CoreError::InternalError(format!("Unserializable passenger draft: {}", e)))?;

        let flow = FlowToken::new(
            FlowKind::PassengerDraft,
            reference.to_string(),
            payload,
            self.clock.now() + self.ttl,
        );
        self.flows.put_flow(&flow).await?;

        debug!("Stashed {} passenger drafts for booking {}", passengers.len(), reference);
        Ok(flow.token)
    }

    /// The draft for `reference`. A token bound to another booking is treated as missing.
    pub async fn load(&self, token: &str, reference: &str) -> CoreResult<Vec<PassengerDetails>> {
        let flow = self
            .flows
            .get_flow(token)
            .await?
            .filter(|f| f.kind == FlowKind::PassengerDraft && f.subject == reference)
            .ok_or_else(|| CoreError::NotFound("Session expired. Please try again.".to_string()))?;

        serde_json::from_value(flow.payload)
            .map_err(|e| CoreError::InternalError(format!("Corrupt passenger draft: {}", e)))
    }

    pub async fn discard(&self, token: &str) -> CoreResult<()> {
        self.flows.remove_flow(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::details;
    use chrono::Utc;
    use skyward_core::clock::ManualClock;
    use skyward_store::memory::MemoryStore;

    fn drafts() -> (PassengerDrafts, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (PassengerDrafts::new(store, clock.clone(), Duration::minutes(30)), clock)
    }

    #[tokio::test]
    async fn test_stash_load_discard() {
        let (drafts, _) = drafts();
        let token = drafts
            .stash("K3M9QZ", &[details("Ana", "Cruz"), details("Ben", "Cruz")])
            .await
            .unwrap();

        let loaded = drafts.load(&token, "K3M9QZ").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].first_name, "Ben");

        drafts.discard(&token).await.unwrap();
        assert!(matches!(drafts.load(&token, "K3M9QZ").await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_draft_bound_to_its_booking() {
        let (drafts, _) = drafts();
        let token = drafts.stash("K3M9QZ", &[details("Ana", "Cruz")]).await.unwrap();

        assert!(drafts.load(&token, "OTHER1").await.is_err());
    }

    #[tokio::test]
    async fn test_draft_expires() {
        let (drafts, clock) = drafts();
        let token = drafts.stash("K3M9QZ", &[details("Ana", "Cruz")]).await.unwrap();

        clock.advance(Duration::minutes(31));
        assert!(matches!(drafts.load(&token, "K3M9QZ").await, Err(CoreError::NotFound(_))));
    }
}
