use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::util;

const ALERT_TTL: Duration = Duration::from_secs(30);

/// A user-visible failure notice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    id: u64,
    pub message: String,
}

#[derive(Debug, Default)]
struct SinkState {
    next_id: u64,
    alerts: Vec<Alert>,
}

/// Time-expiring queue of failure notices.
///
/// The sink is disabled while the session is unauthenticated so expected
/// pre-login failures stay quiet; enablement is driven by the auth session.
/// Expiry is keyed by a per-alert id rather than position, so a timer firing
/// after the list has been mutated can never remove the wrong entry.
#[derive(Clone, Default)]
pub struct AlertSink {
    enabled: Arc<AtomicBool>,
    state: Arc<Mutex<SinkState>>,
}

impl AlertSink {
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Appends an error alert; dropped while the sink is disabled.
    ///
    /// The alert removes itself after 30 seconds unless dismissed earlier.
    pub fn add(&self, message: impl Into<String>) {
        if !self.enabled() {
            return;
        }
        let message = message.into();
        tracing::error!("{message}");

        let id = {
            let mut state = util::lock(&self.state);
            state.next_id += 1;
            let id = state.next_id;
            state.alerts.push(Alert { id, message });
            id
        };

        let sink = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ALERT_TTL).await;
            sink.expire(id);
        });
    }

    /// Removes the alert at `index` immediately.
    pub fn dismiss(&self, index: usize) {
        let mut state = util::lock(&self.state);
        if index < state.alerts.len() {
            state.alerts.remove(index);
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        util::lock(&self.state).alerts.clone()
    }

    fn expire(&self, id: u64) {
        util::lock(&self.state).alerts.retain(|alert| alert.id != id);
    }
}
