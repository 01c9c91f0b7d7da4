//! Native messaging bridge.
//!
//! Wire protocol, codec and the two long-lived tasks that own the native peer's
//! byte streams.
//!
//! # Architecture
//!
//! - **protocol**: Message types (MessageToNative, MessageFromNative)
//! - **codec**: Length-prefixed JSON framing for AsyncRead/AsyncWrite
//! - **queue**: Single writer task; all outbound frames go through it
//! - **inbound**: Single reader task; hands each message to one handler
//!
//! The tasks only see the [`MessageHandler`] and [`NativeSender`] capabilities,
//! never the HTTP layer.

pub mod codec;
pub mod inbound;
pub mod protocol;
pub mod queue;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use self::inbound::{InboundDispatcher, InboundExit, InboundHandle};
use self::protocol::{MessageFromNative, MessageToNative};
use self::queue::OutboundQueue;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("native transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("outbound queue closed")]
    QueueClosed,
    #[error("bridge task failed: {0}")]
    Task(String),
}

/// Receives every message decoded from the native peer.
pub trait MessageHandler<T>: Send + Sync {
    fn handle_message(&self, message: T);
}

/// Sends messages to the native peer.
///
/// This abstraction lets the HTTP layer be tested without a real byte stream.
#[async_trait]
pub trait NativeSender: Send + Sync {
    async fn send(&self, message: MessageToNative) -> Result<(), BridgeError>;
}

/// Both halves of a running bridge.
pub struct Bridge {
    queue: Arc<OutboundQueue>,
    inbound: InboundHandle,
}

impl Bridge {
    /// Start the reader and writer tasks over the native peer's streams.
    pub fn start<R, W, H>(reader: R, writer: W, handler: Arc<H>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        H: MessageHandler<MessageFromNative> + ?Sized + 'static,
    {
        tracing::info!(byte_order = %codec::ByteOrder::native(), "Starting native bridge");
        let queue = Arc::new(OutboundQueue::spawn(writer, queue::DEFAULT_CAPACITY));
        let inbound = InboundDispatcher::spawn::<_, MessageFromNative, _>(reader, handler);
        Self { queue, inbound }
    }

    pub fn sender(&self) -> Arc<OutboundQueue> {
        Arc::clone(&self.queue)
    }

    /// Resolves once the inbound loop has stopped (peer closed or failed).
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        self.inbound.closed()
    }

    /// Drain and stop the writer, then join the reader.
    ///
    /// If the reader is still blocked on the peer, it is aborted.
    pub async fn shutdown(self) -> Result<InboundExit, BridgeError> {
        self.queue.shutdown().await;
        self.inbound.join().await
    }
}
