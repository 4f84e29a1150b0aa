//! Device error notifications.
//!
//! Driver callbacks fire on driver threads. They publish into a broadcast
//! channel owned by the registry, and the owner of the registry drains it on
//! its own loop, so no driver thread ever touches session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the error channel. Slow subscribers lose the oldest events.
pub const ERROR_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceErrorKind {
    Busy,
    Disconnected,
    Hardware,
    StartFailed,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceErrorEvent {
    pub session_id: Uuid,
    pub device: String,
    pub kind: DeviceErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl std::fmt::Display for DeviceErrorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}): {}", self.device, self.kind, self.message)
    }
}

/// Handle a session uses to report asynchronous device errors.
///
/// Cloning is cheap; every clone publishes into the same registry channel and
/// stamps events with the session it was issued for.
#[derive(Clone)]
pub struct ErrorReporter {
    sender: broadcast::Sender<DeviceErrorEvent>,
    session_id: Uuid,
    device: String,
}

impl ErrorReporter {
    pub(crate) fn new(
        sender: broadcast::Sender<DeviceErrorEvent>,
        session_id: Uuid,
        device: String,
    ) -> Self {
        Self {
            sender,
            session_id,
            device,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn report(&self, kind: DeviceErrorKind, message: impl Into<String>) {
        let event = DeviceErrorEvent {
            session_id: self.session_id,
            device: self.device.clone(),
            kind,
            message: message.into(),
            occurred_at: Utc::now(),
        };
        log::warn!("Device error: {}", event);
        // No subscribers is fine; the event is still logged.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_reaches_every_subscriber() {
        let (tx, mut first) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        let mut second = tx.subscribe();
        let reporter = ErrorReporter::new(tx, Uuid::new_v4(), "Front Camera".to_string());

        reporter.report(DeviceErrorKind::Busy, "in use by another application");

        let a = first.try_recv().unwrap();
        let b = second.try_recv().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.kind, DeviceErrorKind::Busy);
        assert_eq!(a.session_id, reporter.session_id());
        assert!(first.try_recv().is_err());
    }

    #[test]
    fn test_report_without_subscribers_does_not_panic() {
        let (tx, rx) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        drop(rx);
        let reporter = ErrorReporter::new(tx, Uuid::new_v4(), "cam".to_string());
        reporter.report(DeviceErrorKind::Other, "nobody listening");
    }
}
