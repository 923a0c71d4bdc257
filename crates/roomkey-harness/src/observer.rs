//! Observer that records every session event.

use roomkey_client::{SessionEvent, SessionObserver};

/// Records events in arrival order for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Vec<SessionEvent>,
}

impl RecordingObserver {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far.
    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    /// Texts of delivered messages, in order.
    pub fn messages(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::MessageDecrypted { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Texts of messages delivered after waiting for a key.
    pub fn recovered_messages(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::MessageDecrypted { text, recovered: true, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of placeholders shown.
    pub fn key_pending_count(&self) -> usize {
        self.events.iter().filter(|event| matches!(event, SessionEvent::KeyPending { .. })).count()
    }

    /// Warnings raised.
    pub fn warnings(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Warning { reason, .. } => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl SessionObserver for RecordingObserver {
    fn on_event(&mut self, event: SessionEvent) {
        self.events.push(event);
    }
}
