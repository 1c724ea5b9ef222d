//! Typed event bus for intra-service communication.
//!
//! Uses tokio broadcast channels so that the code recording a booking, lead
//! or payment does not need to know which side effects follow from it.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// State changes other services react to.
///
/// Ids are public ids (`BK…`, `LD…`, `INV…`, `PY…`, `CH…`) except
/// `business_id`, which is the local row id.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A lead was captured.
    LeadCreated {
        business_id: i64,
        lead_id: String,
    },
    /// A booking and its invoice were stored.
    BookingCreated {
        business_id: i64,
        booking_id: String,
    },
    /// A booking moved to a new slot.
    BookingRescheduled {
        business_id: i64,
        booking_id: String,
    },
    /// A booking was cancelled.
    BookingCancelled {
        business_id: i64,
        booking_id: String,
    },
    /// A booking was marked completed.
    BookingCompleted {
        business_id: i64,
        booking_id: String,
    },
    /// An invoice was created for a booking.
    InvoiceCreated {
        invoice_id: String,
        booking_id: String,
        amount: f64,
    },
    /// A payment was recorded or its status changed.
    PaymentRecorded {
        invoice_id: String,
        payment_id: String,
        status: String,
    },
    /// An invoice became fully paid.
    InvoicePaid {
        invoice_id: String,
    },
    /// A message was appended to a chat transcript.
    ChatMessageSaved {
        business_id: i64,
        chat_id: String,
        role: String,
    },
    /// A customer notification went out.
    ReminderSent {
        business_id: i64,
        kind: String,
        target: String,
    },
}

/// Application-wide event bus backed by a tokio broadcast channel.
///
/// Every subscriber gets every event. Slow subscribers that fall behind
/// receive a `Lagged` error and miss events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<AppEvent>>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to receive application events.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: AppEvent) {
        let label = event_label(&event);
        match self.sender.send(event) {
            Ok(count) => {
                debug!("event_bus: emitted {label} to {count} subscriber(s)");
            }
            Err(_) => {
                debug!("event_bus: no subscribers for {label}");
            }
        }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Human-readable label for an event (for logging).
pub fn event_label(event: &AppEvent) -> &'static str {
    match event {
        AppEvent::LeadCreated { .. } => "LeadCreated",
        AppEvent::BookingCreated { .. } => "BookingCreated",
        AppEvent::BookingRescheduled { .. } => "BookingRescheduled",
        AppEvent::BookingCancelled { .. } => "BookingCancelled",
        AppEvent::BookingCompleted { .. } => "BookingCompleted",
        AppEvent::InvoiceCreated { .. } => "InvoiceCreated",
        AppEvent::PaymentRecorded { .. } => "PaymentRecorded",
        AppEvent::InvoicePaid { .. } => "InvoicePaid",
        AppEvent::ChatMessageSaved { .. } => "ChatMessageSaved",
        AppEvent::ReminderSent { .. } => "ReminderSent",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(AppEvent::BookingCreated {
            business_id: 1,
            booking_id: "BKab12C".into(),
        });

        let event = rx.recv().await.unwrap();
        match event {
            AppEvent::BookingCreated { booking_id, .. } => assert_eq!(booking_id, "BKab12C"),
            _ => panic!("unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(AppEvent::InvoicePaid {
            invoice_id: "INV12345".into(),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers() {
        let bus = EventBus::new(16);
        // Should not panic even with no subscribers
        bus.emit(AppEvent::LeadCreated {
            business_id: 1,
            lead_id: "LDaaaaa".into(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_labels() {
        assert_eq!(
            event_label(&AppEvent::PaymentRecorded {
                invoice_id: String::new(),
                payment_id: String::new(),
                status: String::new(),
            }),
            "PaymentRecorded"
        );
        assert_eq!(
            event_label(&AppEvent::ReminderSent {
                business_id: 1,
                kind: String::new(),
                target: String::new(),
            }),
            "ReminderSent"
        );
    }
}
