use async_trait::async_trait;
use skybook_shared::BookingEvent;
use tokio::sync::Mutex;

use crate::CoreResult;

/// Outbound notifications. Delivery is best-effort: a failed publish is logged
/// by the caller and never rolls back a saga step.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> CoreResult<()>;
}

pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: &BookingEvent) -> CoreResult<()> {
        Ok(())
    }
}

/// Keeps every event in memory; handy for assertions.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<BookingEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<BookingEvent> {
        self.events.lock().await.clone()
    }

    pub async fn names(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(BookingEvent::name).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: &BookingEvent) -> CoreResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
