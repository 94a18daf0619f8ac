//! One-way playback activity notifications.
//!
//! The pipeline announces when a playback starts and finishes; whoever cares
//! (a realtime presence channel, metrics) subscribes. Nothing flows back.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Playback lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackActivity {
    Started {
        session_id: Uuid,
        source_ref: String,
    },
    Finished {
        session_id: Uuid,
        source_ref: String,
        outcome: String,
        bytes_sent: u64,
    },
}

impl PlaybackActivity {
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::Started { session_id, .. } | Self::Finished { session_id, .. } => *session_id,
        }
    }
}

/// Sink for playback activity. Must not block.
pub trait PresenceNotifier: Send + Sync {
    fn notify(&self, activity: PlaybackActivity);
}

/// Broadcast hub; events with no subscribers are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastPresence {
    tx: broadcast::Sender<PlaybackActivity>,
}

impl BroadcastPresence {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackActivity> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastPresence {
    fn default() -> Self {
        Self::new(64)
    }
}

impl PresenceNotifier for BroadcastPresence {
    fn notify(&self, activity: PlaybackActivity) {
        trace!(?activity, "Playback activity");
        let _ = self.tx.send(activity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let hub = BroadcastPresence::new(8);
        let mut rx = hub.subscribe();
        let id = Uuid::new_v4();

        hub.notify(PlaybackActivity::Started {
            session_id: id,
            source_ref: "abc".into(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id(), id);
    }

    #[test]
    fn notify_without_subscribers_is_fine() {
        let hub = BroadcastPresence::default();
        hub.notify(PlaybackActivity::Finished {
            session_id: Uuid::new_v4(),
            source_ref: "abc".into(),
            outcome: "completed".into(),
            bytes_sent: 0,
        });
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(PlaybackActivity::Started {
            session_id: Uuid::nil(),
            source_ref: "abc".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "started");
        assert_eq!(json["source_ref"], "abc");
    }
}
