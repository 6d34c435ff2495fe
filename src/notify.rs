//! User notifications.
//!
//! Messages are sent after the state change they describe has committed.
//! Delivery is best-effort: a failure is logged and never undoes the change.

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{Result, StationError};
use crate::station::{ChargingStatus, QueueStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeKind {
    /// The user's pile failed; the request moved to the priority queue
    PileFailure,
    /// The user's charge was cut short by a pile failure
    ChargingInterrupted,
    /// A pile came back and the user's request is being rescheduled
    PileRecoveryRebalance,
    /// The charge finished and a bill was issued
    ChargeCompleted,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoticeKind::PileFailure => "PILE_FAILURE",
            NoticeKind::ChargingInterrupted => "CHARGING_INTERRUPTED",
            NoticeKind::PileRecoveryRebalance => "PILE_RECOVERY_REBALANCE",
            NoticeKind::ChargeCompleted => "CHARGE_COMPLETED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub request_id: String,
    pub pile_id: Option<String>,
    pub message: String,
}

/// Anything pushed to a user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Outbound {
    Notice(Notice),
    Status(ChargingStatus),
    Queue(QueueStatus),
}

/// A message addressed to a user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub user_id: String,
    pub message: Outbound,
}

impl Delivery {
    pub fn notice(user_id: &str, kind: NoticeKind, request_id: &str, pile_id: Option<&str>, message: String) -> Self {
        Self {
            user_id: user_id.to_string(),
            message: Outbound::Notice(Notice {
                kind,
                request_id: request_id.to_string(),
                pile_id: pile_id.map(str::to_string),
                message,
            }),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn send(&self, user_id: &str, message: &Outbound) -> Result<()>;
}

/// Send every delivery, logging the ones that fail
pub fn dispatch(notifier: &dyn Notifier, deliveries: &[Delivery]) {
    for delivery in deliveries {
        if let Err(e) = notifier.send(&delivery.user_id, &delivery.message) {
            log::warn!("Failed to notify {}: {}", delivery.user_id, e);
        }
    }
}

/// Writes every message to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, user_id: &str, message: &Outbound) -> Result<()> {
        log::info!("notify {}: {}", user_id, serde_json::to_string(message)?);
        Ok(())
    }
}

/// Forwards messages to an async consumer
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn send(&self, user_id: &str, message: &Outbound) -> Result<()> {
        self.tx
            .send(Delivery {
                user_id: user_id.to_string(),
                message: message.clone(),
            })
            .map_err(|_| StationError::Notification("receiver dropped".to_string()))
    }
}

/// Keeps messages in memory until taken
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Delivery>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything sent so far
    pub fn take(&self) -> Vec<Delivery> {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *sent)
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, user_id: &str, message: &Outbound) -> Result<()> {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.push(Delivery {
            user_id: user_id.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn send(&self, _user_id: &str, _message: &Outbound) -> Result<()> {
            Err(StationError::Notification("offline".to_string()))
        }
    }

    fn notice() -> Delivery {
        Delivery::notice(
            "alice",
            NoticeKind::PileFailure,
            "F1",
            Some("F001"),
            "pile F001 failed".to_string(),
        )
    }

    #[test]
    fn test_memory_notifier_take() {
        let notifier = MemoryNotifier::new();
        dispatch(&notifier, &[notice(), notice()]);
        assert_eq!(notifier.take().len(), 2);
        assert!(notifier.take().is_empty());
    }

    #[test]
    fn test_dispatch_swallows_failures() {
        dispatch(&FailingNotifier, &[notice()]);
    }

    #[tokio::test]
    async fn test_channel_notifier() {
        let (notifier, mut rx) = ChannelNotifier::new();
        dispatch(&notifier, &[notice()]);
        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.user_id, "alice");
        assert!(matches!(delivery.message, Outbound::Notice(ref n) if n.kind == NoticeKind::PileFailure));
    }

    #[test]
    fn test_channel_notifier_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let err = notifier.send("alice", &notice().message).unwrap_err();
        assert!(matches!(err, StationError::Notification(_)));
    }

    #[test]
    fn test_outbound_json_shape() {
        let json = serde_json::to_value(&notice().message).unwrap();
        assert_eq!(json["type"], "notice");
        assert_eq!(json["data"]["kind"], "PILE_FAILURE");
    }
}
