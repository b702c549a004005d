//! Best-effort change notification
//!
//! Every accepted mutation publishes a notification after it commits.
//! Delivery is fire-and-forget over a broadcast channel: a full buffer or an
//! absent subscriber never fails or delays the mutation that triggered it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{ConferenceId, EventId};

/// A notification scope. Subscribers filter on these; a single mutation may
/// fan out to several (an event change also touches its conference and stage
/// feeds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Topic {
    Event { event_id: EventId },
    Conference { conference_id: ConferenceId },
    Stage { stage: String },
}

/// What changed. Payloads carry identifiers, not entity bodies; clients
/// refetch what they care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    QuestionCreated { question_uid: String },
    QuestionUpdated { question_uid: String },
    QuestionRemoved { question_uid: String },
    VoteChanged { question_uid: String, votes: u64 },
    Reaction { reaction_uid: String },
    EventLive { event_uid: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub topic: Topic,
    pub change: ChangeKind,
}

pub type NotificationReceiver = broadcast::Receiver<Notification>;

pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> NotificationReceiver {
        self.sender.subscribe()
    }

    /// Publish to one topic. Send errors only mean nobody is listening.
    pub fn publish(&self, topic: Topic, change: ChangeKind) {
        let notification = Notification { topic, change };
        if self.sender.send(notification).is_err() {
            debug!("notification dropped: no subscribers");
        }
    }

    /// Fan one change out to several topics.
    pub fn publish_all(&self, topics: impl IntoIterator<Item = Topic>, change: ChangeKind) {
        for topic in topics {
            self.publish(topic, change.clone());
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let notifier = Notifier::new(4);
        notifier.publish(
            Topic::Stage {
                stage: "main".to_string(),
            },
            ChangeKind::EventLive {
                event_uid: "keynote".to_string(),
            },
        );
    }

    #[tokio::test]
    async fn subscriber_receives_fanout() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();
        notifier.publish_all(
            [
                Topic::Event { event_id: 1 },
                Topic::Conference { conference_id: 2 },
            ],
            ChangeKind::QuestionCreated {
                question_uid: "q1".to_string(),
            },
        );
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.topic, Topic::Event { event_id: 1 });
        assert_eq!(second.topic, Topic::Conference { conference_id: 2 });
    }
}
