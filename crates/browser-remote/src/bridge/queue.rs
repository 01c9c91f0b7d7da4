//! Outbound queue: the single writer of the native peer's input stream.
//!
//! Producers enqueue messages from any task; one consumer task encodes and
//! writes them in FIFO order, so frames are never interleaved.

use async_trait::async_trait;
use futures::SinkExt;
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;

use super::codec::JsonCodec;
use super::protocol::MessageToNative;
use super::{BridgeError, NativeSender};

/// One pending message per producer before it has to wait for the writer.
pub const DEFAULT_CAPACITY: usize = 1;

enum Command<T> {
    Send(T),
    Shutdown,
}

/// Handle to the writer task.
pub struct OutboundQueue<T = MessageToNative> {
    tx: mpsc::Sender<Command<T>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> OutboundQueue<T>
where
    T: Serialize + Send + 'static,
{
    /// Spawn the writer task over `writer`.
    pub fn spawn<W>(writer: W, capacity: usize) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_with_codec(writer, JsonCodec::new(), capacity)
    }

    pub fn spawn_with_codec<W>(writer: W, codec: JsonCodec<T>, capacity: usize) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let framed = FramedWrite::new(writer, codec);
        let task = tokio::spawn(run_writer(framed, rx));
        Self {
            tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue a message for the writer task.
    ///
    /// Waits only while the queue is full. Fails once the queue is shut down or
    /// the writer has stopped on a transport error.
    pub async fn enqueue(&self, message: T) -> Result<(), BridgeError> {
        self.tx
            .send(Command::Send(message))
            .await
            .map_err(|_| BridgeError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Write everything already queued, close the stream and stop the writer.
    ///
    /// Safe to call more than once and from several tasks at once; every call
    /// returns only after the writer has stopped.
    pub async fn shutdown(&self) {
        // Fails if the writer already stopped; nothing is left to drain then.
        let _ = self.tx.send(Command::Shutdown).await;

        // Held across the join so concurrent callers wait for the drain too.
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take()
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Outbound writer task failed");
        }
    }
}

#[async_trait]
impl NativeSender for OutboundQueue<MessageToNative> {
    async fn send(&self, message: MessageToNative) -> Result<(), BridgeError> {
        self.enqueue(message).await
    }
}

async fn run_writer<W, T>(mut writer: FramedWrite<W, JsonCodec<T>>, mut rx: mpsc::Receiver<Command<T>>)
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut sent: u64 = 0;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Send(message) => {
                if let Err(e) = writer.send(message).await {
                    tracing::error!(error = %e, "Failed to write frame to native peer");
                    return;
                }
                sent += 1;
            }
            Command::Shutdown => {
                tracing::debug!("Outbound queue shutting down, draining");
                rx.close();
                while let Some(command) = rx.recv().await {
                    if let Command::Send(message) = command {
                        if let Err(e) = writer.send(message).await {
                            tracing::error!(error = %e, "Failed to write frame while draining");
                            return;
                        }
                        sent += 1;
                    }
                }
                break;
            }
        }
    }

    if let Err(e) = writer.close().await {
        tracing::warn!(error = %e, "Failed to close native output stream");
    }
    tracing::debug!(frames = sent, "Outbound writer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::CorrelationId;
    use futures::StreamExt;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio_util::codec::FramedRead;

    fn query(q: &str) -> MessageToNative {
        MessageToNative::query(CorrelationId::new(), q, None)
    }

    #[tokio::test]
    async fn writes_in_fifo_order() {
        let (host_out, peer_in) = tokio::io::duplex(64 * 1024);
        let queue = OutboundQueue::<MessageToNative>::spawn(host_out, DEFAULT_CAPACITY);

        for i in 0..5 {
            queue.enqueue(query(&format!("q{i}"))).await.unwrap();
        }
        queue.shutdown().await;

        let reader = FramedRead::new(peer_in, JsonCodec::<MessageToNative>::new());
        let queries: Vec<String> = reader
            .map(|frame| frame.unwrap().message.unwrap().query)
            .collect()
            .await;
        assert_eq!(queries, vec!["q0", "q1", "q2", "q3", "q4"]);
    }

    #[tokio::test]
    async fn concurrent_producers_never_tear_frames() {
        let (host_out, peer_in) = tokio::io::duplex(256);
        let queue = Arc::new(OutboundQueue::<MessageToNative>::spawn(host_out, DEFAULT_CAPACITY));

        let mut producers = Vec::new();
        for i in 0..20 {
            let queue = Arc::clone(&queue);
            producers.push(tokio::spawn(async move {
                let payload = format!("producer-{i}-{}", "x".repeat(100));
                queue.enqueue(query(&payload)).await.unwrap();
            }));
        }

        let mut reader = FramedRead::new(peer_in, JsonCodec::<MessageToNative>::new());
        let mut seen = HashSet::new();
        for _ in 0..20 {
            let msg = reader.next().await.unwrap().unwrap().message.unwrap();
            assert!(msg.query.starts_with("producer-"));
            seen.insert(msg.query);
        }
        assert_eq!(seen.len(), 20);

        for producer in producers {
            producer.await.unwrap();
        }
        queue.shutdown().await;
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_flushes_queued_messages_and_is_idempotent() {
        let (host_out, peer_in) = tokio::io::duplex(64 * 1024);
        let queue = OutboundQueue::<MessageToNative>::spawn(host_out, 8);

        queue.enqueue(query("a")).await.unwrap();
        queue.enqueue(query("b")).await.unwrap();
        queue.enqueue(query("c")).await.unwrap();

        queue.shutdown().await;
        queue.shutdown().await;
        assert!(queue.is_closed());
        assert!(matches!(
            queue.enqueue(query("late")).await,
            Err(BridgeError::QueueClosed)
        ));

        let reader = FramedRead::new(peer_in, JsonCodec::<MessageToNative>::new());
        let frames: Vec<_> = reader.collect().await;
        assert_eq!(frames.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_shutdowns_all_wait_for_the_drain() {
        let (host_out, peer_in) = tokio::io::duplex(64);
        let queue = Arc::new(OutboundQueue::<MessageToNative>::spawn(host_out, 8));
        for q in ["a", "b", "c"] {
            queue.enqueue(query(q)).await.unwrap();
        }

        // The peer buffer is too small for three frames, so the writer blocks
        // until the reader below starts consuming.
        let shutdowns: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.shutdown().await })
            })
            .collect();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        for shutdown in &shutdowns {
            assert!(!shutdown.is_finished());
        }

        let reader = FramedRead::new(peer_in, JsonCodec::<MessageToNative>::new());
        let frames: Vec<_> = reader.collect().await;
        assert_eq!(frames.len(), 3);

        for shutdown in shutdowns {
            shutdown.await.unwrap();
        }
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn write_failure_closes_the_queue() {
        let (host_out, peer_in) = tokio::io::duplex(64);
        drop(peer_in);
        let queue = OutboundQueue::<MessageToNative>::spawn(host_out, DEFAULT_CAPACITY);

        // First send is accepted by the channel; the writer then fails and exits.
        let _ = queue.enqueue(query("lost")).await;
        queue.shutdown().await;
        assert!(queue.enqueue(query("after")).await.is_err());
    }
}
