//! In-process message relay for signals between agents of one run.
//!
//! Strict FIFO. A message becomes visible to [`MessageBroker::subscribe`]
//! once `publish` has returned, and each message is handed out at most once.
//!
//! The queue is mutex-protected, so publishing from several threads is safe,
//! but [`MessageBroker::drain`] is not atomic with respect to concurrent
//! publishers: a message published while a drain is in progress may land in
//! this drain or stay queued for the next one. Runs avoid the question by
//! scheduling every publisher before the single drainer.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Kind of signal a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// A developer reported being blocked.
    Blocker,
    /// No recent code activity on an assigned ticket.
    NoActivity,
    /// Triage found nobody to take a ticket.
    Unassignable,
    /// Anything else.
    General,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Blocker => "blocker",
            Topic::NoActivity => "no_activity",
            Topic::Unassignable => "unassignable",
            Topic::General => "general",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A published message. Owned by whoever received it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    pub topic: Topic,
    /// Ticket the signal concerns, if any.
    pub ticket_key: Option<String>,
    pub content: String,
    pub published_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            topic: Topic::General,
            ticket_key: None,
            content: content.into(),
            published_at: Utc::now(),
        }
    }

    pub fn on_topic(mut self, topic: Topic) -> Self {
        self.topic = topic;
        self
    }

    pub fn about(mut self, ticket_key: impl Into<String>) -> Self {
        self.ticket_key = Some(ticket_key.into());
        self
    }
}

/// FIFO queue of [`Message`]s.
#[derive(Default)]
pub struct MessageBroker {
    queue: Mutex<VecDeque<Message>>,
}

impl MessageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a general message. Never blocks.
    pub fn publish(&self, sender: impl Into<String>, content: impl Into<String>) -> Uuid {
        self.publish_message(Message::new(sender, content))
    }

    /// Publish a prepared message and return its id.
    pub fn publish_message(&self, message: Message) -> Uuid {
        let id = message.id;
        debug!(sender = %message.sender, topic = %message.topic, "Message published");
        self.queue.lock().push_back(message);
        id
    }

    /// Pop the oldest message, or `None` when the queue is empty. Never blocks.
    pub fn subscribe(&self) -> Option<Message> {
        let message = self.queue.lock().pop_front();
        if let Some(message) = &message {
            debug!(sender = %message.sender, topic = %message.topic, "Message dispatched");
        }
        message
    }

    /// Call [`subscribe`](Self::subscribe) until the queue is empty.
    pub fn drain(&self) -> Vec<Message> {
        let mut drained = Vec::new();
        while let Some(message) = self.subscribe() {
            drained.push(message);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_then_empty() {
        let broker = MessageBroker::new();
        broker.publish("dev-monitor", "A");
        broker.publish("dev-monitor", "B");

        assert_eq!(broker.subscribe().unwrap().content, "A");
        assert_eq!(broker.subscribe().unwrap().content, "B");
        assert!(broker.subscribe().is_none());
    }

    #[test]
    fn test_second_drain_is_empty() {
        let broker = MessageBroker::new();
        broker.publish("triage", "A");
        broker.publish("triage", "B");

        let first: Vec<String> = broker.drain().into_iter().map(|m| m.content).collect();
        assert_eq!(first, vec!["A", "B"]);
        assert!(broker.drain().is_empty());
        assert!(broker.is_empty());
    }

    #[test]
    fn test_typed_message_round_trip() {
        let broker = MessageBroker::new();
        let id = broker.publish_message(
            Message::new("dev-monitor", "Blocked on API keys")
                .on_topic(Topic::Blocker)
                .about("SM-12"),
        );

        assert_eq!(broker.len(), 1);
        let message = broker.subscribe().unwrap();
        assert_eq!(message.id, id);
        assert_eq!(message.topic, Topic::Blocker);
        assert_eq!(message.ticket_key.as_deref(), Some("SM-12"));
    }

    #[test]
    fn test_concurrent_publishers_lose_nothing() {
        use std::sync::Arc;
        use std::thread;

        let broker = Arc::new(MessageBroker::new());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let broker = Arc::clone(&broker);
                thread::spawn(move || {
                    for i in 0..25 {
                        broker.publish(format!("agent-{}", n), format!("{}", i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(broker.drain().len(), 100);
    }
}
