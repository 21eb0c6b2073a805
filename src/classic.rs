//! Classic Bluetooth serial transport.
//!
//! Wraps an RFCOMM stream to the amp. The OS stack buffers the stream, so
//! there is no ring buffer here; the staging queue in [`crate::stream`]
//! only bridges tokio's readiness model to the non-blocking read surface.
//!
//! Classic Bluetooth goes through BlueZ and is therefore Linux-only; on
//! other platforms [`connect`](crate::Transport::connect) reports
//! [`NotSupported`](crate::Error::NotSupported).

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::stream::InboundQueue;
use crate::transport::Transport;

#[cfg(target_os = "linux")]
use bytes::Bytes;
#[cfg(target_os = "linux")]
use tokio::io::AsyncWriteExt;
#[cfg(target_os = "linux")]
use tokio::sync::mpsc;
#[cfg(target_os = "linux")]
use tracing::{debug, info, warn};

#[cfg(target_os = "linux")]
type RfcommWriter = tokio::io::WriteHalf<bluer::rfcomm::Stream>;

/// Classic Bluetooth (RFCOMM) transport to the amp.
///
/// Unlike BLE there is no passive rescanning posture: connection attempts
/// are bounded and reconnection after a drop is caller-driven.
pub struct ClassicTransport {
    device_name: String,
    local_alias: String,
    channel: u8,
    max_retries: u32,
    retry_delay: Duration,
    connected: Arc<AtomicBool>,
    inbound: InboundQueue,
    #[cfg(target_os = "linux")]
    inbound_tx: mpsc::UnboundedSender<Bytes>,
    #[cfg(target_os = "linux")]
    writer: tokio::sync::Mutex<Option<RfcommWriter>>,
    #[cfg(target_os = "linux")]
    reader_handle: parking_lot::RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl ClassicTransport {
    /// Create a classic transport from the bridge configuration.
    pub fn new(config: &BridgeConfig) -> Self {
        #[allow(unused_variables)]
        let (inbound, inbound_tx) = InboundQueue::new();
        Self {
            device_name: config.device_name.clone(),
            local_alias: config.local_alias.clone(),
            channel: config.classic_channel,
            max_retries: config.classic_max_retries,
            retry_delay: config.classic_retry_delay,
            connected: Arc::new(AtomicBool::new(false)),
            inbound,
            #[cfg(target_os = "linux")]
            inbound_tx,
            #[cfg(target_os = "linux")]
            writer: tokio::sync::Mutex::new(None),
            #[cfg(target_os = "linux")]
            reader_handle: parking_lot::RwLock::new(None),
        }
    }
}

#[cfg(target_os = "linux")]
impl ClassicTransport {
    async fn connect_rfcomm(&self) -> Result<()> {
        let session = bluer::Session::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        adapter
            .set_powered(true)
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;
        if let Err(e) = adapter.set_alias(self.local_alias.clone()).await {
            debug!("Failed to set adapter alias: {}", e);
        }

        let address = self.find_device(&adapter).await?;
        let target = bluer::rfcomm::SocketAddr::new(address, self.channel);

        let mut attempts = 0;
        let stream = loop {
            attempts += 1;
            debug!("Connection attempt {} of {}", attempts, self.max_retries);

            match bluer::rfcomm::Stream::connect(target).await {
                Ok(stream) => break stream,
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempts, e);
                    if attempts >= self.max_retries {
                        return Err(Error::ConnectFailed {
                            reason: format!("failed after {} attempts", self.max_retries),
                        });
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        };

        let (reader, writer) = tokio::io::split(stream);
        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::SeqCst);

        let handle = crate::stream::spawn_reader(
            reader,
            self.inbound_tx.clone(),
            self.connected.clone(),
            "rfcomm",
        );
        if let Some(old) = self.reader_handle.write().replace(handle) {
            old.abort();
        }

        info!("Classic Bluetooth link to {} up", address);
        Ok(())
    }

    /// Look the amp up among known devices, then by inquiry scan.
    async fn find_device(&self, adapter: &bluer::Adapter) -> Result<bluer::Address> {
        use futures::stream::StreamExt;

        // Devices BlueZ already knows about (paired or previously seen).
        if let Ok(addresses) = adapter.device_addresses().await {
            for address in addresses {
                if self.device_matches(adapter, address).await {
                    debug!("Found known device {}", address);
                    return Ok(address);
                }
            }
        }

        info!("Discovering \"{}\"", self.device_name);
        let mut events = adapter
            .discover_devices()
            .await
            .map_err(|e| Error::ConnectFailed {
                reason: format!("discovery failed: {}", e),
            })?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        loop {
            tokio::select! {
                event = events.next() => {
                    match event {
                        Some(bluer::AdapterEvent::DeviceAdded(address)) => {
                            if self.device_matches(adapter, address).await {
                                return Ok(address);
                            }
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }

        Err(Error::DeviceNotFound {
            name: self.device_name.clone(),
        })
    }

    async fn device_matches(&self, adapter: &bluer::Adapter, address: bluer::Address) -> bool {
        let Ok(device) = adapter.device(address) else {
            return false;
        };
        match device.name().await {
            Ok(Some(name)) => crate::ble::scanner::matches_target(&name, &self.device_name),
            _ => false,
        }
    }
}

#[async_trait]
impl Transport for ClassicTransport {
    async fn connect(&self) -> Result<()> {
        #[cfg(target_os = "linux")]
        {
            self.connect_rfcomm().await
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(Error::NotSupported {
                operation: "classic Bluetooth requires BlueZ".to_string(),
            })
        }
    }

    fn available(&self) -> usize {
        self.inbound.available()
    }

    fn read_byte(&self) -> Result<u8> {
        self.inbound.read_byte()
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        #[cfg(target_os = "linux")]
        {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().ok_or(Error::NotConnected)?;
            writer.write_all(data).await?;
            writer.flush().await?;
            Ok(())
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = data;
            Err(Error::NotConnected)
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disconnected() {
        let transport = ClassicTransport::new(&BridgeConfig::default());
        assert!(!transport.is_connected());
        assert_eq!(transport.available(), 0);
        assert!(matches!(transport.read_byte(), Err(Error::Underflow)));
    }

    #[tokio::test]
    async fn test_write_without_connection_fails() {
        let transport = ClassicTransport::new(&BridgeConfig::default());
        assert!(matches!(
            transport.write(&[0x01]).await,
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = BridgeConfig {
            classic_max_retries: 7,
            classic_retry_delay: Duration::from_millis(250),
            ..Default::default()
        };
        let transport = ClassicTransport::new(&config);
        assert_eq!(transport.max_retries, 7);
        assert_eq!(transport.retry_delay, Duration::from_millis(250));
        assert_eq!(transport.channel, 1);
    }
}
