use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::{Appointment, NotificationEvent, NotificationEventType};

pub type NotificationReceiver = broadcast::Receiver<NotificationEvent>;

/// Fire-and-forget hand-off of scheduling events; delivery happens elsewhere.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

pub fn event_for(appointment: &Appointment, event_type: NotificationEventType) -> NotificationEvent {
    NotificationEvent {
        appointment_id: appointment.id,
        event_type,
        recipients: appointment.participants(),
    }
}

pub struct BroadcastNotifier {
    sender: broadcast::Sender<NotificationEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> NotificationReceiver {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify(&self, event: NotificationEvent) {
        info!(
            "Appointment {} {:?}, notifying {} recipients",
            event.appointment_id, event.event_type, event.recipients.len()
        );

        if self.sender.send(event).is_err() {
            debug!("No notification subscribers connected");
        }
    }
}
