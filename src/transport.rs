//! The uniform transport contract and the façade that selects one
//! implementation at startup.
//!
//! The rest of the firmware only ever talks to [`TransportFacade`]; which
//! radio is behind it is fixed by [`TransportMode`] when the bridge starts.

use async_trait::async_trait;
use tracing::info;

use crate::ble::BleTransport;
use crate::classic::ClassicTransport;
use crate::config::{BridgeConfig, TransportMode};
use crate::error::Result;

/// Byte-stream contract shared by both radio transports.
///
/// Reads are non-blocking: `read_byte` is only valid when `available()`
/// reports data, and returns [`Underflow`](crate::Error::Underflow)
/// otherwise. Writes are valid only while connected and fail with
/// [`NotConnected`](crate::Error::NotConnected) after a disconnect.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Drive the transport through discovery and connection until it is
    /// ready to relay bytes.
    async fn connect(&self) -> Result<()>;

    /// Number of bytes ready to read.
    fn available(&self) -> usize;

    /// Take the oldest received byte.
    fn read_byte(&self) -> Result<u8>;

    /// Send bytes to the amp.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Whether the transport is currently connected.
    ///
    /// Callers poll this rather than blocking on connection progress.
    fn is_connected(&self) -> bool;
}

/// Dispatches the uniform contract to the transport selected at startup.
pub struct TransportFacade {
    inner: Box<dyn Transport>,
    mode: TransportMode,
}

impl TransportFacade {
    /// Build the transport named by `config.mode`.
    pub async fn new(config: &BridgeConfig) -> Result<Self> {
        info!("Selecting {} transport", config.mode);
        let inner: Box<dyn Transport> = match config.mode {
            TransportMode::Ble => Box::new(BleTransport::new(config).await?),
            TransportMode::Classic => Box::new(ClassicTransport::new(config)),
        };
        Ok(Self {
            inner,
            mode: config.mode,
        })
    }

    /// Wrap an already-built transport. Used by tests and by callers that
    /// construct a transport with non-default wiring.
    pub fn with_transport(inner: Box<dyn Transport>, mode: TransportMode) -> Self {
        Self { inner, mode }
    }

    /// The mode selected at startup.
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// See [`Transport::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    /// See [`Transport::available`].
    pub fn available(&self) -> usize {
        self.inner.available()
    }

    /// See [`Transport::read_byte`].
    pub fn read_byte(&self) -> Result<u8> {
        self.inner.read_byte()
    }

    /// See [`Transport::write`].
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.inner.write(data).await
    }

    /// See [`Transport::is_connected`].
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Records every call so forwarding can be verified verbatim.
    #[derive(Default)]
    struct RecordingTransport {
        connects: AtomicUsize,
        written: Mutex<Vec<Vec<u8>>>,
        inbound: Mutex<Vec<u8>>,
    }

    #[async_trait]
    impl Transport for Arc<RecordingTransport> {
        async fn connect(&self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn available(&self) -> usize {
            self.inbound.lock().len()
        }

        fn read_byte(&self) -> Result<u8> {
            let mut inbound = self.inbound.lock();
            if inbound.is_empty() {
                return Err(crate::Error::Underflow);
            }
            Ok(inbound.remove(0))
        }

        async fn write(&self, data: &[u8]) -> Result<()> {
            self.written.lock().push(data.to_vec());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connects.load(Ordering::SeqCst) > 0
        }
    }

    #[tokio::test]
    async fn test_facade_forwards_verbatim() {
        let recording = Arc::new(RecordingTransport::default());
        recording.inbound.lock().extend_from_slice(&[0xAB, 0xCD]);

        let facade =
            TransportFacade::with_transport(Box::new(recording.clone()), TransportMode::Classic);
        assert_eq!(facade.mode(), TransportMode::Classic);

        assert!(!facade.is_connected());
        facade.connect().await.unwrap();
        assert!(facade.is_connected());
        assert_eq!(recording.connects.load(Ordering::SeqCst), 1);

        assert_eq!(facade.available(), 2);
        assert_eq!(facade.read_byte().unwrap(), 0xAB);
        assert_eq!(facade.read_byte().unwrap(), 0xCD);
        assert!(matches!(facade.read_byte(), Err(crate::Error::Underflow)));

        facade.write(&[1, 2, 3]).await.unwrap();
        facade.write(&[4]).await.unwrap();
        assert_eq!(*recording.written.lock(), vec![vec![1, 2, 3], vec![4]]);
    }
}
