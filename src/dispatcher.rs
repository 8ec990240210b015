//! Fan-out dispatcher: one inbound event stream, N subscribers.
//!
//! The generator is timing-sensitive, so a slow subscriber must never
//! back-pressure it. Every subscriber gets its own bounded queue;
//! dispatch uses a non-blocking send and drops the event for any
//! subscriber whose queue is full, counting the drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::Event;

/// Copies events from one source channel to every subscriber
pub struct Dispatcher {
    source: Mutex<Option<mpsc::Receiver<Event>>>,
    subscribers: Mutex<Vec<mpsc::Sender<Event>>>,
    buffer_size: usize,
    dropped_total: AtomicU64,
}

impl Dispatcher {
    /// `buffer_size` is the capacity of each subscriber queue.
    pub fn new(source: mpsc::Receiver<Event>, buffer_size: usize) -> Self {
        Dispatcher {
            source: Mutex::new(Some(source)),
            subscribers: Mutex::new(Vec::new()),
            buffer_size,
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber and return its receive queue.
    ///
    /// Safe to call before `run`; a late subscriber only sees events
    /// dispatched after its subscription.
    pub fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Total events dropped across all subscribers since construction.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// Copy events until the source closes or the token is cancelled.
    /// All subscriber queues are closed on return.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut source = match self.source.lock().unwrap().take() {
            Some(source) => source,
            None => {
                warn!("dispatcher run called twice");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = source.recv() => {
                    match event {
                        Some(event) => self.dispatch(event),
                        None => break,
                    }
                }
            }
        }

        // Dropping the senders closes every subscriber queue.
        self.subscribers.lock().unwrap().clear();
        debug!("dispatcher stopped");
    }

    fn dispatch(&self, event: Event) {
        // Copy under lock, send outside it.
        let subscribers: Vec<mpsc::Sender<Event>> =
            self.subscribers.lock().unwrap().clone();

        let mut dropped = 0u64;
        for subscriber in &subscribers {
            if subscriber.try_send(event.clone()).is_err() {
                dropped += 1;
            }
        }

        if dropped > 0 {
            self.dropped_total.fetch_add(dropped, Ordering::Relaxed);
            warn!(
                event_id = %event.event_id,
                subscribers = dropped,
                "dropped event for subscribers with full buffers"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Meta, Session, Signal, SignalValue, Source, SourceType};
    use std::time::Duration;

    fn test_event(id: &str, sequence: u64) -> Event {
        Event {
            schema_version: crate::event::SCHEMA_VERSION.to_string(),
            event_id: id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            source: Source {
                kind: SourceType::Wearable,
                id: "mock-watch-01".to_string(),
                side: None,
            },
            session: Session {
                run_id: "run".to_string(),
                scenario: "baseline".to_string(),
                seed: 1,
            },
            signal: Signal {
                name: "ppg.hr_bpm".to_string(),
                unit: "bpm".to_string(),
                value: SignalValue::Scalar(72.0),
                quality: 1.0,
            },
            meta: Meta { sequence },
        }
    }

    async fn drain(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        received
    }

    #[tokio::test]
    async fn test_single_subscriber_receives_all_events() {
        let (tx, rx) = mpsc::channel(10);
        let dispatcher = Dispatcher::new(rx, 10);
        let subscriber = dispatcher.subscribe();

        for i in 0..5 {
            tx.send(test_event(&format!("event-{i}"), i + 1)).await.unwrap();
        }
        drop(tx);

        dispatcher.run(CancellationToken::new()).await;
        let received = drain(subscriber).await;
        assert_eq!(received.len(), 5);
    }

    #[tokio::test]
    async fn test_subscribers_receive_same_events_in_order() {
        let (tx, rx) = mpsc::channel(10);
        let dispatcher = Dispatcher::new(rx, 10);
        let sub1 = dispatcher.subscribe();
        let sub2 = dispatcher.subscribe();

        for i in 0..3 {
            tx.send(test_event(&format!("event-{i}"), i + 1)).await.unwrap();
        }
        drop(tx);

        dispatcher.run(CancellationToken::new()).await;

        let ids1: Vec<String> = drain(sub1).await.into_iter().map(|e| e.event_id).collect();
        let ids2: Vec<String> = drain(sub2).await.into_iter().map(|e| e.event_id).collect();
        assert_eq!(ids1, vec!["event-0", "event-1", "event-2"]);
        assert_eq!(ids1, ids2);
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_without_blocking() {
        let (tx, rx) = mpsc::channel(32);
        let dispatcher = std::sync::Arc::new(Dispatcher::new(rx, 2));
        let fast = dispatcher.subscribe();
        // The slow subscriber never consumes; its 2-slot buffer fills.
        let slow = dispatcher.subscribe();

        // Fast consumer drains continuously while the dispatcher runs.
        let fast_task = tokio::spawn(drain(fast));
        let run_handle = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(CancellationToken::new()).await })
        };

        for i in 0..20 {
            tx.send(test_event(&format!("event-{i}"), i + 1)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        drop(tx);
        run_handle.await.unwrap();

        let fast_received = fast_task.await.unwrap();
        let slow_received = drain(slow).await;

        assert_eq!(fast_received.len(), 20);
        assert!(slow_received.len() < 20);
        assert!(dispatcher.dropped_count() > 0);
        assert_eq!(
            dispatcher.dropped_count(),
            (20 - slow_received.len()) as u64
        );
    }

    #[tokio::test]
    async fn test_subscriber_count_returns_to_zero_after_run() {
        let (tx, rx) = mpsc::channel(4);
        let dispatcher = Dispatcher::new(rx, 4);

        assert_eq!(dispatcher.subscriber_count(), 0);
        let _sub1 = dispatcher.subscribe();
        let _sub2 = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 2);

        drop(tx);
        dispatcher.run(CancellationToken::new()).await;
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_run_and_closes_queues() {
        let (tx, rx) = mpsc::channel(4);
        let dispatcher = std::sync::Arc::new(Dispatcher::new(rx, 4));
        let mut subscriber = dispatcher.subscribe();

        let cancel = CancellationToken::new();
        let run_handle = {
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run(cancel).await })
        };

        tx.send(test_event("before-cancel", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), run_handle)
            .await
            .expect("dispatcher did not stop after cancellation")
            .unwrap();

        // Queue eventually reports closed once drained.
        let mut closed = false;
        for _ in 0..2 {
            if subscriber.recv().await.is_none() {
                closed = true;
                break;
            }
        }
        assert!(closed, "subscriber queue not closed after run exit");
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_later_events() {
        let (tx, rx) = mpsc::channel(10);
        let dispatcher = std::sync::Arc::new(Dispatcher::new(rx, 10));
        let early = dispatcher.subscribe();

        let run_handle = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(CancellationToken::new()).await })
        };

        tx.send(test_event("first", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let late = dispatcher.subscribe();
        tx.send(test_event("second", 2)).await.unwrap();
        drop(tx);
        run_handle.await.unwrap();

        assert_eq!(drain(early).await.len(), 2);
        let late_ids: Vec<String> =
            drain(late).await.into_iter().map(|e| e.event_id).collect();
        assert_eq!(late_ids, vec!["second"]);
    }
}
