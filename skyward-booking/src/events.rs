use skyward_shared::SeatEvent;
use tokio::sync::broadcast;

/// Fan-out of seat map changes. Publishing with no subscribers is not an error.
#[derive(Clone, Default)]
pub struct SeatEvents {
    sender: Option<broadcast::Sender<SeatEvent>>,
}

impl SeatEvents {
    pub fn new(sender: broadcast::Sender<SeatEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    pub fn publish(&self, event: SeatEvent) {
        if let Some(sender) = &self.sender {
            // Err only means nobody is listening right now
            let _ = sender.send(event);
        }
    }
}
