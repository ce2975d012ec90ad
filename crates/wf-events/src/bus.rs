use crate::types::EventRecord;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Subscribes to records published under a single topic.
    pub fn subscribe_topic(&self, topic: impl Into<String>) -> TopicSubscription {
        TopicSubscription {
            topic: topic.into(),
            receiver: self.sender.subscribe(),
            lagged: 0,
        }
    }

    pub fn publish(
        &self,
        event: EventRecord,
    ) -> Result<(), broadcast::error::SendError<EventRecord>> {
        self.sender.send(event).map(|_| ())
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct TopicSubscription {
    topic: String,
    receiver: broadcast::Receiver<EventRecord>,
    lagged: u64,
}

impl TopicSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Number of records dropped because this subscriber fell behind.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    /// Waits for the next record on this topic. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EventRecord> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.is_topic(&self.topic) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => self.lagged += skipped,
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Drains records already buffered for this topic without waiting.
    pub fn drain(&mut self) -> Vec<EventRecord> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.is_topic(&self.topic) => events.push(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => self.lagged += skipped,
                Err(_) => return events,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventSource;
    use chrono::Utc;

    fn record(topic: &str, seq: i64) -> EventRecord {
        EventRecord {
            id: format!("evt_{seq}"),
            seq,
            at: Utc::now(),
            topic: Some(topic.to_string()),
            correlation_id: None,
            source: EventSource::Worker,
            body: serde_json::json!({ "seq": seq }),
        }
    }

    #[tokio::test]
    async fn topic_subscription_skips_other_topics() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe_topic("job_a");
        bus.publish(record("job_b", 1)).unwrap();
        bus.publish(record("job_a", 2)).unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.seq, 2);
        assert_eq!(sub.topic(), "job_a");
    }

    #[test]
    fn drain_returns_buffered_records_in_order() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe_topic("job_a");
        bus.publish(record("job_a", 1)).unwrap();
        bus.publish(record("job_b", 2)).unwrap();
        bus.publish(record("job_a", 3)).unwrap();

        let seqs: Vec<i64> = sub.drain().iter().map(|event| event.seq).collect();
        assert_eq!(seqs, vec![1, 3]);
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn lag_is_counted_not_fatal() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe_topic("job_a");
        for seq in 0..5 {
            bus.publish(record("job_a", seq)).unwrap();
        }
        let events = sub.drain();
        assert!(sub.lagged() > 0);
        assert_eq!(events.last().map(|event| event.seq), Some(4));
    }
}
