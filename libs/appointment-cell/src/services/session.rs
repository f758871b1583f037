use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_utils::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub appointment_id: Uuid,
    pub started_at: NaiveDateTime,
}

/// Registry of running consultations, `appointment_id -> started_at`.
///
/// Elapsed time is always recomputed from the wall clock, so a session can be
/// rebuilt from the `consultation_started_at` stored on the appointment.
pub struct ConsultationSessions {
    sessions: RwLock<HashMap<Uuid, NaiveDateTime>>,
    clock: Arc<dyn Clock>,
}

impl ConsultationSessions {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Starts timing now, or returns the session already running.
    pub async fn start(&self, appointment_id: Uuid) -> SessionHandle {
        let now = self.clock.now();
        self.restore(appointment_id, now).await
    }

    /// Registers a session that began at `started_at` unless one is running.
    pub async fn restore(&self, appointment_id: Uuid, started_at: NaiveDateTime) -> SessionHandle {
        let mut sessions = self.sessions.write().await;
        let started_at = *sessions.entry(appointment_id).or_insert_with(|| {
            debug!("Consultation session opened for appointment {}", appointment_id);
            started_at
        });

        SessionHandle { appointment_id, started_at }
    }

    pub async fn get(&self, appointment_id: Uuid) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(&appointment_id)
            .map(|started_at| SessionHandle { appointment_id, started_at: *started_at })
    }

    pub fn elapsed(&self, handle: &SessionHandle) -> Duration {
        (self.clock.now() - handle.started_at).max(Duration::zero())
    }

    /// Discards the session and returns how long it ran.
    pub async fn stop(&self, handle: &SessionHandle) -> Duration {
        self.sessions.write().await.remove(&handle.appointment_id);
        debug!("Consultation session closed for appointment {}", handle.appointment_id);
        self.elapsed(handle)
    }

    pub async fn discard(&self, appointment_id: Uuid) {
        self.sessions.write().await.remove(&appointment_id);
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
