//! Wired serial channel.
//!
//! Thin adapter over the UART that carries the other side of the bridge,
//! exposing the same available/read/write surface as the radio transports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use crate::error::{Error, Result};
use crate::stream::InboundQueue;

/// Serial port endpoint at a fixed baud rate.
pub struct SerialChannel {
    inbound: InboundQueue,
    writer: tokio::sync::Mutex<tokio::io::WriteHalf<tokio_serial::SerialStream>>,
    open: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl SerialChannel {
    /// Open the port and start the reader task.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let stream = tokio_serial::new(path, baud_rate).open_native_async()?;
        info!("Serial port {} open at {} baud", path, baud_rate);

        let (reader, writer) = tokio::io::split(stream);
        let (inbound, inbound_tx) = InboundQueue::new();
        let open = Arc::new(AtomicBool::new(true));

        let reader_handle = crate::stream::spawn_reader(reader, inbound_tx, open.clone(), "serial");

        Ok(Self {
            inbound,
            writer: tokio::sync::Mutex::new(writer),
            open,
            reader_handle,
        })
    }

    /// Number of bytes ready to read.
    pub fn available(&self) -> usize {
        self.inbound.available()
    }

    /// Take the oldest received byte.
    pub fn read_byte(&self) -> Result<u8> {
        self.inbound.read_byte()
    }

    /// Write bytes out the port.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Whether the port is still usable.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let result = SerialChannel::open("/dev/nonexistent-port-for-test", 1_000_000);
        assert!(result.is_err());
    }
}
