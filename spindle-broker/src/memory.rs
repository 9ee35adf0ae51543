//! In-process broker backed by tokio channels

use async_trait::async_trait;
use parking_lot::Mutex;
use spindle_interfaces::{Broker, BrokerError, DeliveryHandler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, warn};

/// Configuration for the in-memory broker
#[derive(Debug, Clone, Default)]
pub struct InMemoryBrokerConfig {
    /// Put a delivery back on its queue when the handler fails.
    /// When false, failed deliveries are discarded.
    pub requeue_on_error: bool,
}

struct Queue {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    published: AtomicU64,
    delivered: AtomicU64,
}

impl Queue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }
}

/// Broker that keeps one unbounded FIFO per routing key.
///
/// Messages published before a consumer attaches are buffered. Only one
/// consumer drains a queue at a time; further consumers of the same key wait
/// for the first to stop.
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    closed: watch::Sender<bool>,
    config: InMemoryBrokerConfig,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_config(InMemoryBrokerConfig::default())
    }

    pub fn with_config(config: InMemoryBrokerConfig) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            queues: Mutex::new(HashMap::new()),
            closed,
            config,
        }
    }

    fn queue(&self, routing_key: &str) -> Arc<Queue> {
        self.queues
            .lock()
            .entry(routing_key.to_string())
            .or_insert_with(|| Arc::new(Queue::new()))
            .clone()
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Messages accepted for `routing_key` so far
    pub fn published_count(&self, routing_key: &str) -> u64 {
        self.queue(routing_key).published.load(Ordering::SeqCst)
    }

    /// Deliveries handed to a consumer of `routing_key` so far
    pub fn delivered_count(&self, routing_key: &str) -> u64 {
        self.queue(routing_key).delivered.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, body: Vec<u8>, routing_key: &str) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        let queue = self.queue(routing_key);
        queue.sender.send(body).map_err(|e| BrokerError::Publish {
            routing_key: routing_key.to_string(),
            message: e.to_string(),
        })?;
        queue.published.fetch_add(1, Ordering::SeqCst);

        debug!("Published message to queue {}", routing_key);
        Ok(())
    }

    async fn consume(
        &self,
        routing_key: &str,
        concurrency: usize,
        handler: DeliveryHandler,
    ) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        let queue = self.queue(routing_key);
        let limit = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut closed = self.closed.subscribe();
        let mut receiver = queue.receiver.lock().await;

        info!(
            "Consuming queue {} with concurrency {}",
            routing_key,
            concurrency.max(1)
        );

        loop {
            let permit = tokio::select! {
                biased;
                _ = closed.wait_for(|closed| *closed) => break,
                permit = limit.clone().acquire_owned() => permit.map_err(|e| BrokerError::Consume {
                    routing_key: routing_key.to_string(),
                    message: e.to_string(),
                })?,
            };

            let body = tokio::select! {
                biased;
                _ = closed.wait_for(|closed| *closed) => break,
                body = receiver.recv() => match body {
                    Some(body) => body,
                    None => break,
                },
            };
            queue.delivered.fetch_add(1, Ordering::SeqCst);

            let handler = handler.clone();
            let requeue = self.config.requeue_on_error.then(|| (queue.sender.clone(), body.clone()));
            let key = routing_key.to_string();

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = handler(body).await {
                    match requeue {
                        Some((sender, body)) => {
                            warn!("Delivery on {} failed, requeueing: {:#}", key, e);
                            let _ = sender.send(body);
                        }
                        None => warn!("Delivery on {} failed, discarding: {:#}", key, e),
                    }
                }
            });
        }

        info!("Stopped consuming queue {}", routing_key);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.send_replace(true);
        info!("In-memory broker closed");
        Ok(())
    }
}
