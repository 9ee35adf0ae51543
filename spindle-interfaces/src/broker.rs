//! Message broker interface

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

/// Callback invoked once per delivery.
///
/// `Ok` acknowledges the delivery; `Err` is a negative acknowledgement and
/// the broker applies its own requeue-or-discard policy.
pub type DeliveryHandler =
    Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Broker errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker is closed")]
    Closed,

    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Failed to publish to '{routing_key}': {message}")]
    Publish { routing_key: String, message: String },

    #[error("Failed to consume from '{routing_key}': {message}")]
    Consume { routing_key: String, message: String },
}

/// Transport that moves serialized states from publishers to consumers
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a message body to the queue named by `routing_key`
    async fn publish(&self, body: Vec<u8>, routing_key: &str) -> Result<(), BrokerError>;

    /// Consume the queue named by `routing_key`, running at most `concurrency`
    /// handlers at once.
    ///
    /// Runs until the broker is closed; this is a long-running call.
    async fn consume(
        &self,
        routing_key: &str,
        concurrency: usize,
        handler: DeliveryHandler,
    ) -> Result<(), BrokerError>;

    /// Stop all deliveries and release the connection
    async fn close(&self) -> Result<(), BrokerError>;
}
