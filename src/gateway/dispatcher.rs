use axum::extract::ws::Utf8Bytes;

use super::audience::Audience;
use super::events::Event;
use super::session::{DeliveryReport, SessionRegistry};

/// Pushes events to whichever audience members are connected.
///
/// Callers must only dispatch after the mutation that produced the event has
/// committed.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sessions: SessionRegistry,
}

impl NotificationDispatcher {
    pub fn new(sessions: SessionRegistry) -> Self {
        Self { sessions }
    }

    /// Serialize `event` once and hand the same buffer to every recipient.
    pub fn dispatch(&self, audience: &Audience, event: &Event) -> DeliveryReport {
        if audience.is_empty() {
            return DeliveryReport::default();
        }
        let Some(frame) = encode(event) else {
            return DeliveryReport {
                failed: audience.len(),
                ..Default::default()
            };
        };

        let report = self.sessions.send_to(audience.iter(), &frame);
        tracing::debug!(
            event = event.kind(),
            delivered = report.delivered,
            offline = report.offline,
            failed = report.failed,
            "dispatched"
        );
        report
    }

    /// Dispatch a distinct event to each recipient, e.g. per-member chat snapshots.
    pub fn dispatch_each<I>(&self, events: I) -> DeliveryReport
    where
        I: IntoIterator<Item = (String, Event)>,
    {
        let mut total = DeliveryReport::default();
        for (user_id, event) in events {
            let report = self.dispatch(&Audience::single(user_id), &event);
            total.delivered += report.delivered;
            total.offline += report.offline;
            total.failed += report.failed;
        }
        total
    }
}

fn encode(event: &Event) -> Option<Utf8Bytes> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Utf8Bytes::from(text)),
        Err(e) => {
            tracing::warn!(event = event.kind(), "failed to encode event: {e}");
            None
        }
    }
}
