// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Single-consumer in-process dispatch queue.
//!
//! Events inserted into the queue are delivered to every subscriber, in
//! registration order, by exactly one consumer task. The lifecycle is
//! one-way: `Idle -> Running -> Stopped`, and a stopped queue never
//! restarts. The subscriber set is frozen once the queue starts.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::aggregator::Collector;
use crate::event::Event;

/// Buffered events before `insert` starts blocking the producer.
const QUEUE_DEPTH: usize = 100;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is not running")]
    NotRunning,

    #[error("queue is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Bounded dispatch queue with a frozen-at-start subscriber list.
///
/// The single state flag is the only lock-free state; the subscriber list
/// is guarded by a mutex that is never held across dispatch.
pub struct Queue {
    state: AtomicU8,
    tx: mpsc::Sender<Arc<Event>>,
    rx: Mutex<Option<mpsc::Receiver<Arc<Event>>>>,
    subscribers: Mutex<Vec<Arc<dyn Collector>>>,
}

impl Queue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        Self {
            state: AtomicU8::new(IDLE),
            tx,
            rx: Mutex::new(Some(rx)),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a collector to receive every dispatched event.
    ///
    /// Fails with [`QueueError::AlreadyRunning`] once the queue has started;
    /// the subscriber set is frozen at start time.
    pub fn subscribe(&self, collector: Arc<dyn Collector>) -> Result<()> {
        if self.state.load(Ordering::Acquire) != IDLE {
            return Err(QueueError::AlreadyRunning);
        }
        self.subscribers.lock().push(collector);
        Ok(())
    }

    /// Buffer an event for dispatch.
    ///
    /// Blocks the caller while the buffer is full; that is the natural
    /// backpressure signal toward the transport layer. Inserting `None` is
    /// an accepted no-op and dispatches nothing.
    pub async fn insert(&self, ev: Option<Event>) -> Result<()> {
        if !self.is_running() {
            return Err(QueueError::NotRunning);
        }
        let Some(ev) = ev else {
            return Ok(());
        };
        self.tx
            .send(Arc::new(ev))
            .await
            .map_err(|_| QueueError::NotRunning)
    }

    /// Consume buffered events until the token is cancelled.
    ///
    /// Invokes every subscriber sequentially per event. A failing subscriber
    /// is logged and never stops delivery to the remaining subscribers, nor
    /// does the failure reach the producer. Returns once cancelled; the
    /// queue is then permanently stopped.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.try_start()?;

        // try_start succeeds exactly once, so the receiver is still here.
        let Some(mut rx) = self.rx.lock().take() else {
            return Err(QueueError::AlreadyRunning);
        };
        let subscribers = self.subscribers.lock().clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                ev = rx.recv() => {
                    let Some(ev) = ev else { break };
                    for subscriber in &subscribers {
                        if let Err(err) = subscriber.add(Arc::clone(&ev)).await {
                            tracing::warn!(
                                event_type = %ev.event_type,
                                %err,
                                "subscriber rejected event"
                            );
                        }
                    }
                }
            }
        }

        self.mark_stopped();
        Ok(())
    }

    fn try_start(&self) -> Result<()> {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| QueueError::AlreadyRunning)
    }

    fn mark_stopped(&self) {
        let _ = self
            .state
            .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire);
    }

    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingSubscriber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Collector for CountingSubscriber {
        async fn add(&self, _ev: Arc<Event>) -> std::result::Result<(), AggregatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> std::result::Result<(), AggregatorError> {
            Ok(())
        }
    }

    async fn wait_until_running(queue: &Queue) {
        while queue.insert(None).await.is_err() {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_for_calls(subscriber: &CountingSubscriber, expected: usize) {
        for _ in 0..1000 {
            if subscriber.calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_queue_flow() {
        let queue = Arc::new(Queue::new());
        let subscriber = Arc::new(CountingSubscriber {
            calls: AtomicUsize::new(0),
        });

        queue.subscribe(subscriber.clone()).unwrap();
        queue.subscribe(subscriber.clone()).unwrap();

        // insert before start
        assert_eq!(
            queue.insert(Some(Event::default())).await,
            Err(QueueError::NotRunning)
        );

        let shutdown = CancellationToken::new();
        let consumer = {
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.run(shutdown).await })
        };
        wait_until_running(&queue).await;

        // subscriber set is frozen now
        assert_eq!(
            queue.subscribe(subscriber.clone()),
            Err(QueueError::AlreadyRunning)
        );

        for _ in 0..100 {
            queue.insert(Some(Event::default())).await.unwrap();
        }
        wait_for_calls(&subscriber, 200).await;
        assert_eq!(subscriber.calls.load(Ordering::SeqCst), 200);

        shutdown.cancel();
        consumer.await.unwrap().unwrap();

        // terminal state: neither restart nor insert is possible
        assert_eq!(
            queue.run(CancellationToken::new()).await,
            Err(QueueError::AlreadyRunning)
        );
        assert_eq!(
            queue.insert(Some(Event::default())).await,
            Err(QueueError::NotRunning)
        );
    }

    #[tokio::test]
    async fn test_insert_none_dispatches_nothing() {
        let queue = Arc::new(Queue::new());
        let subscriber = Arc::new(CountingSubscriber {
            calls: AtomicUsize::new(0),
        });
        queue.subscribe(subscriber.clone()).unwrap();

        let shutdown = CancellationToken::new();
        let consumer = {
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.run(shutdown).await })
        };
        wait_until_running(&queue).await;

        queue.insert(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(subscriber.calls.load(Ordering::SeqCst), 0);

        shutdown.cancel();
        consumer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_second_start_fails() {
        let queue = Arc::new(Queue::new());
        let shutdown = CancellationToken::new();
        let consumer = {
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.run(shutdown).await })
        };
        wait_until_running(&queue).await;

        assert_eq!(
            queue.run(CancellationToken::new()).await,
            Err(QueueError::AlreadyRunning)
        );

        shutdown.cancel();
        consumer.await.unwrap().unwrap();
    }
}
