//! Stream endpoint plumbing shared by the wired serial channel and the
//! classic Bluetooth transport.
//!
//! Tokio streams expose readiness, not a byte count, so each stream-backed
//! endpoint runs a reader task that forwards delivered chunks into a
//! staging queue. The queue is what makes `available()` and `read_byte()`
//! non-blocking; the OS still does the real buffering underneath.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Staging queue between a reader task and the non-blocking read surface.
pub(crate) struct InboundQueue {
    rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    pending: Mutex<VecDeque<u8>>,
}

impl InboundQueue {
    /// Create a queue and the sender half its reader task feeds.
    pub(crate) fn new() -> (Self, mpsc::UnboundedSender<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(rx),
                pending: Mutex::new(VecDeque::new()),
            },
            tx,
        )
    }

    /// Number of bytes ready to read.
    pub(crate) fn available(&self) -> usize {
        self.drain_channel();
        self.pending.lock().len()
    }

    /// Take the oldest byte, if any has been delivered.
    pub(crate) fn read_byte(&self) -> crate::Result<u8> {
        self.drain_channel();
        self.pending.lock().pop_front().ok_or(crate::Error::Underflow)
    }

    /// Move everything the reader task has delivered into the pending queue.
    fn drain_channel(&self) {
        let mut rx = self.rx.lock();
        let mut pending = self.pending.lock();
        while let Ok(chunk) = rx.try_recv() {
            pending.extend(chunk.iter());
        }
    }
}

/// Spawn the reader task for a stream endpoint.
///
/// Reads until EOF or error, forwarding each delivered chunk to the
/// staging queue. Clears `connected` when the stream ends so the owning
/// transport can report [`NotConnected`](crate::Error::NotConnected).
pub(crate) fn spawn_reader<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<Bytes>,
    connected: Arc<AtomicBool>,
    label: &'static str,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("{} stream closed by peer", label);
                    break;
                }
                Ok(n) => {
                    if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        // Receiver side dropped; endpoint is shutting down.
                        break;
                    }
                }
                Err(e) => {
                    warn!("{} read failed: {}", label, e);
                    break;
                }
            }
        }
        connected.store(false, Ordering::SeqCst);
        debug!("{} reader task ended", label);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_queue_fifo() {
        let (queue, tx) = InboundQueue::new();
        tx.send(Bytes::from_static(&[1, 2])).unwrap();
        tx.send(Bytes::from_static(&[3])).unwrap();

        assert_eq!(queue.available(), 3);
        assert_eq!(queue.read_byte().unwrap(), 1);
        assert_eq!(queue.read_byte().unwrap(), 2);
        assert_eq!(queue.read_byte().unwrap(), 3);
        assert!(matches!(queue.read_byte(), Err(crate::Error::Underflow)));
    }

    #[test]
    fn test_inbound_queue_empty() {
        let (queue, _tx) = InboundQueue::new();
        assert_eq!(queue.available(), 0);
        assert!(queue.read_byte().is_err());
    }

    #[tokio::test]
    async fn test_reader_task_forwards_and_clears_connected() {
        let (queue, tx) = InboundQueue::new();
        let connected = Arc::new(AtomicBool::new(true));

        let data: &[u8] = &[0x10, 0x20, 0x30];
        let handle = spawn_reader(data, tx, connected.clone(), "test");
        handle.await.unwrap();

        assert_eq!(queue.available(), 3);
        assert_eq!(queue.read_byte().unwrap(), 0x10);
        // EOF on the fake stream ends the task and drops the link flag.
        assert!(!connected.load(Ordering::SeqCst));
    }
}
