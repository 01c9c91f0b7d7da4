//! Inbound dispatcher: the single reader of the native peer's output stream.

use std::sync::Arc;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

use super::codec::JsonCodec;
use super::{BridgeError, MessageHandler};

/// How the reader loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundExit {
    /// Peer closed its stream between frames.
    EndOfStream { frames: u64, malformed: u64 },
    /// Stopped by the owner while still waiting on the peer.
    Aborted,
}

pub struct InboundDispatcher;

impl InboundDispatcher {
    /// Spawn the reader loop. Every well-formed message goes to `handler`.
    pub fn spawn<R, T, H>(reader: R, handler: Arc<H>) -> InboundHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
        T: DeserializeOwned + Send + 'static,
        H: MessageHandler<T> + ?Sized + 'static,
    {
        Self::spawn_with_codec(reader, JsonCodec::<T>::new(), handler)
    }

    pub fn spawn_with_codec<R, T, H>(reader: R, codec: JsonCodec<T>, handler: Arc<H>) -> InboundHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
        T: DeserializeOwned + Send + 'static,
        H: MessageHandler<T> + ?Sized + 'static,
    {
        let (closed_tx, closed_rx) = watch::channel(false);
        let framed = FramedRead::new(reader, codec);
        let task = tokio::spawn(async move {
            let result = read_loop(framed, handler.as_ref()).await;
            let _ = closed_tx.send(true);
            result
        });
        InboundHandle { task, closed_rx }
    }
}

/// Owner's view of the reader task.
pub struct InboundHandle {
    task: JoinHandle<Result<InboundExit, BridgeError>>,
    closed_rx: watch::Receiver<bool>,
}

impl InboundHandle {
    /// Resolves once the loop has stopped for any reason.
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut closed_rx = self.closed_rx.clone();
        async move {
            while !*closed_rx.borrow() {
                if closed_rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop's result, aborting it if it is still reading.
    pub async fn join(self) -> Result<InboundExit, BridgeError> {
        if !self.task.is_finished() {
            tracing::debug!("Inbound reader still running, aborting");
            self.task.abort();
        }
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(InboundExit::Aborted),
            Err(e) => Err(BridgeError::Task(e.to_string())),
        }
    }
}

async fn read_loop<R, T, H>(
    mut reader: FramedRead<R, JsonCodec<T>>,
    handler: &H,
) -> Result<InboundExit, BridgeError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
    H: MessageHandler<T> + ?Sized,
{
    tracing::info!("Native messaging reader started");
    let mut frames: u64 = 0;
    let mut malformed: u64 = 0;

    while let Some(frame) = reader.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, frames, "Native stream failed mid-frame");
                return Err(BridgeError::Transport(e));
            }
        };
        frames += 1;

        match frame.message {
            Ok(message) => {
                tracing::trace!(frame_len = frame.len, "Message received from native peer");
                handler.handle_message(message);
            }
            Err(e) => {
                malformed += 1;
                tracing::error!(
                    error = %e,
                    frame_len = frame.len,
                    oversized = frame.oversized,
                    "Dropping undecodable message from native peer"
                );
            }
        }
    }

    tracing::info!(frames, malformed, "Native stream closed");
    Ok(InboundExit::EndOfStream { frames, malformed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::codec::ByteOrder;
    use crate::bridge::protocol::MessageFromNative;
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;

    #[derive(Default)]
    struct Collect(Mutex<Vec<MessageFromNative>>);

    impl MessageHandler<MessageFromNative> for Collect {
        fn handle_message(&self, message: MessageFromNative) {
            self.0.lock().unwrap().push(message);
        }
    }

    fn raw_frame(payload: &[u8]) -> Vec<u8> {
        let len = payload.len() as u32;
        let mut out = match ByteOrder::native() {
            ByteOrder::Little => len.to_le_bytes().to_vec(),
            ByteOrder::Big => len.to_be_bytes().to_vec(),
        };
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn delivers_in_arrival_order_and_ends_on_eof() {
        let (host_in, mut peer_out) = tokio::io::duplex(1024);
        let handler = Arc::new(Collect::default());
        let handle = InboundDispatcher::spawn::<_, MessageFromNative, _>(host_in, Arc::clone(&handler));

        peer_out.write_all(&raw_frame(br#"{"id":"1","status":"ok"}"#)).await.unwrap();
        peer_out.write_all(&raw_frame(br#"{"id":"2","status":"ok"}"#)).await.unwrap();
        drop(peer_out);

        handle.closed().await;
        let exit = handle.join().await.unwrap();
        assert_eq!(exit, InboundExit::EndOfStream { frames: 2, malformed: 0 });

        let ids: Vec<_> = handler.0.lock().unwrap().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_and_loop_continues() {
        let (host_in, mut peer_out) = tokio::io::duplex(1024);
        let handler = Arc::new(Collect::default());
        let handle = InboundDispatcher::spawn::<_, MessageFromNative, _>(host_in, Arc::clone(&handler));

        peer_out.write_all(&raw_frame(b"{\"id\": ")).await.unwrap();
        peer_out.write_all(&raw_frame(br#"{"id":"after","status":"ok"}"#)).await.unwrap();
        drop(peer_out);

        let exit = handle.join_after_close().await;
        assert_eq!(exit, InboundExit::EndOfStream { frames: 2, malformed: 1 });

        let seen = handler.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, "after");
    }

    #[tokio::test]
    async fn stream_closed_mid_frame_is_fatal() {
        let (host_in, mut peer_out) = tokio::io::duplex(1024);
        let handler = Arc::new(Collect::default());
        let handle = InboundDispatcher::spawn::<_, MessageFromNative, _>(host_in, Arc::clone(&handler));

        let frame = raw_frame(br#"{"id":"cut","status":"ok"}"#);
        peer_out.write_all(&frame[..frame.len() / 2]).await.unwrap();
        drop(peer_out);

        handle.closed().await;
        assert!(matches!(handle.join().await, Err(BridgeError::Transport(_))));
        assert!(handler.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_closed_after_length_prefix_is_fatal() {
        let (host_in, mut peer_out) = tokio::io::duplex(1024);
        let handler = Arc::new(Collect::default());
        let handle = InboundDispatcher::spawn::<_, MessageFromNative, _>(host_in, Arc::clone(&handler));

        let frame = raw_frame(br#"{"id":"cut","status":"ok"}"#);
        peer_out.write_all(&frame[..4]).await.unwrap();
        drop(peer_out);

        handle.closed().await;
        assert!(matches!(handle.join().await, Err(BridgeError::Transport(_))));
        assert!(handler.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_aborts_a_blocked_reader() {
        let (host_in, _peer_out) = tokio::io::duplex(1024);
        let handler = Arc::new(Collect::default());
        let handle = InboundDispatcher::spawn::<_, MessageFromNative, _>(host_in, handler);

        assert!(!handle.is_finished());
        assert_eq!(handle.join().await.unwrap(), InboundExit::Aborted);
    }

    impl InboundHandle {
        async fn join_after_close(self) -> InboundExit {
            self.closed().await;
            self.join().await.unwrap()
        }
    }
}
