//! In-process fan-out of values produced by task executions

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use crate::error::CollectorError;

struct Envelope {
    value: Value,
    /// Present on unbuffered collectors; fired once a puller takes the value
    delivered: Option<oneshot::Sender<()>>,
}

struct Inner {
    sender: mpsc::Sender<Envelope>,
    receiver: Mutex<mpsc::Receiver<Envelope>>,
    closed: watch::Sender<bool>,
    unbuffered: bool,
}

/// FIFO channel of JSON values shared by every execution of a task.
///
/// `push` applies backpressure: on an unbuffered collector it returns only
/// once a consumer has pulled the value, on a buffered one it waits for free
/// capacity. Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("unbuffered", &self.inner.unbuffered)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Collector {
    /// Create a collector. `None` or `Some(0)` gives rendezvous semantics.
    pub fn new(buffer_size: Option<usize>) -> Self {
        let (capacity, unbuffered) = match buffer_size {
            Some(size) if size > 0 => (size, false),
            _ => (1, true),
        };
        let (sender, receiver) = mpsc::channel(capacity);
        let (closed, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                sender,
                receiver: Mutex::new(receiver),
                closed,
                unbuffered,
            }),
        }
    }

    pub fn unbuffered() -> Self {
        Self::new(None)
    }

    pub fn buffered(size: usize) -> Self {
        Self::new(Some(size))
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Enqueue a value, waiting while the channel is full or, when
    /// unbuffered, until a consumer takes it.
    pub async fn push(&self, value: Value) -> Result<(), CollectorError> {
        if self.is_closed() {
            return Err(CollectorError::Closed);
        }

        let (delivered, ack) = if self.inner.unbuffered {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut closed = self.inner.closed.subscribe();
        tokio::select! {
            sent = self.inner.sender.send(Envelope { value, delivered }) => {
                sent.map_err(|_| CollectorError::Closed)?;
            }
            _ = closed.wait_for(|closed| *closed) => return Err(CollectorError::Closed),
        }

        if let Some(ack) = ack {
            // A value already queued when the collector closes stays drainable
            tokio::select! {
                _ = ack => {}
                _ = closed.wait_for(|closed| *closed) => {}
            }
        }

        Ok(())
    }

    /// Take the next value. Waits while the channel is empty and open;
    /// after [`close`](Self::close) it drains what is left, then yields `None`.
    pub async fn pull(&self) -> Option<Value> {
        let mut receiver = self.inner.receiver.lock().await;
        let mut closed = self.inner.closed.subscribe();

        let envelope = tokio::select! {
            biased;
            envelope = receiver.recv() => envelope,
            _ = closed.wait_for(|closed| *closed) => receiver.try_recv().ok(),
        };

        envelope.map(|envelope| {
            if let Some(delivered) = envelope.delivered {
                let _ = delivered.send(());
            }
            envelope.value
        })
    }

    /// Feed every value to `f` until the collector is closed and drained
    pub async fn consume<F>(&self, mut f: F)
    where
        F: FnMut(Value),
    {
        while let Some(value) = self.pull().await {
            f(value);
        }
    }

    /// Like [`consume`](Self::consume) but stops as soon as `shutdown` resolves
    pub async fn consume_until<F, S>(&self, shutdown: S, mut f: F)
    where
        F: FnMut(Value),
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => return,
                value = self.pull() => match value {
                    Some(value) => f(value),
                    None => return,
                },
            }
        }
    }

    /// Close the collector. Only call once all producers are done.
    pub fn close(&self) {
        self.inner.closed.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_unbuffered_push_blocks_until_pull() {
        let collector = Collector::unbuffered();

        let producer = collector.clone();
        let handle = tokio::spawn(async move { producer.push(json!(1)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        assert_eq!(collector.pull().await, Some(json!(1)));
        let pushed = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(pushed.is_ok());
    }

    #[tokio::test]
    async fn test_buffered_push_does_not_block_until_full() {
        let collector = Collector::buffered(3);

        for i in 0..3 {
            timeout(Duration::from_millis(100), collector.push(json!(i)))
                .await
                .expect("push within capacity must not block")
                .unwrap();
        }

        let blocked = timeout(Duration::from_millis(50), collector.push(json!(3))).await;
        assert!(blocked.is_err());

        assert_eq!(collector.pull().await, Some(json!(0)));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let collector = Collector::buffered(4);
        collector.push(json!("a")).await.unwrap();
        collector.push(json!("b")).await.unwrap();
        collector.close();

        assert_eq!(collector.push(json!("c")).await, Err(CollectorError::Closed));
        assert_eq!(collector.pull().await, Some(json!("a")));
        assert_eq!(collector.pull().await, Some(json!("b")));
        assert_eq!(collector.pull().await, None);
        assert_eq!(collector.pull().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_puller() {
        let collector = Collector::unbuffered();
        let consumer = collector.clone();
        let handle = tokio::spawn(async move { consumer.pull().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        collector.close();

        let pulled = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(pulled, None);
    }

    #[tokio::test]
    async fn test_consume_collects_in_order() {
        let collector = Collector::buffered(8);
        for i in 0..5 {
            collector.push(json!(i)).await.unwrap();
        }
        collector.close();

        let mut seen = Vec::new();
        collector.consume(|value| seen.push(value)).await;
        assert_eq!(seen, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_consume_until_stops_on_shutdown() {
        let collector = Collector::buffered(2);
        collector.push(json!(1)).await.unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let consumer = collector.clone();
        let handle = tokio::spawn(async move {
            let mut count = 0;
            consumer
                .consume_until(
                    async {
                        let _ = stop_rx.await;
                    },
                    |_| count += 1,
                )
                .await;
            count
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(()).unwrap();
        let count = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(count, 1);
    }
}
