//! The bridging loop.
//!
//! Relays bytes both directions between the wired serial channel and the
//! active radio transport. The loop never blocks on either side: each
//! iteration drains whatever is available and sleeps briefly only when
//! both directions are idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::serial::SerialChannel;
use crate::transport::TransportFacade;

/// Upper bound on bytes relayed per direction per iteration.
const MAX_BATCH: usize = 512;

/// Delay when neither direction moved any bytes.
const IDLE_DELAY: Duration = Duration::from_millis(1);

/// Serial-to-radio bridge.
pub struct Bridge {
    serial: SerialChannel,
    transport: TransportFacade,
    running: Arc<AtomicBool>,
}

impl Bridge {
    /// Open the serial port and build the configured radio transport.
    pub async fn new(config: &BridgeConfig) -> Result<Self> {
        let serial = SerialChannel::open(&config.serial_port, config.baud_rate)?;
        let transport = TransportFacade::new(config).await?;
        Ok(Self::with_parts(serial, transport))
    }

    /// Assemble a bridge from already-built endpoints.
    pub fn with_parts(serial: SerialChannel, transport: TransportFacade) -> Self {
        Self {
            serial,
            transport,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Drive the radio transport to its connected state.
    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    /// The radio side of the bridge.
    pub fn transport(&self) -> &TransportFacade {
        &self.transport
    }

    /// Relay bytes until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("Bridge running");

        while self.running.load(Ordering::SeqCst) {
            let moved_out = self.pump_serial_to_radio().await;
            let moved_in = self.pump_radio_to_serial().await?;

            if !moved_out && !moved_in {
                tokio::time::sleep(IDLE_DELAY).await;
            }
        }

        info!("Bridge stopped");
        Ok(())
    }

    /// Stop the relay loop after the current iteration.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the relay loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Serial to radio. Radio failures are logged and tolerated: the bytes
    /// of one batch are lost, the bridge keeps running, and the transport
    /// recovers the link on its own.
    async fn pump_serial_to_radio(&self) -> bool {
        let mut batch = Vec::with_capacity(MAX_BATCH.min(self.serial.available()));
        while batch.len() < MAX_BATCH {
            match self.serial.read_byte() {
                Ok(byte) => batch.push(byte),
                Err(_) => break,
            }
        }
        if batch.is_empty() {
            return false;
        }

        if let Err(e) = self.transport.write(&batch).await {
            warn!("Dropped {} outbound bytes: {}", batch.len(), e);
        }
        true
    }

    /// Radio to serial. A serial write failure is fatal: without the wired
    /// side there is nothing left to bridge.
    async fn pump_radio_to_serial(&self) -> Result<bool> {
        let mut batch = Vec::with_capacity(MAX_BATCH.min(self.transport.available()));
        while batch.len() < MAX_BATCH {
            match self.transport.read_byte() {
                Ok(byte) => batch.push(byte),
                Err(_) => break,
            }
        }
        if batch.is_empty() {
            return Ok(false);
        }

        self.serial.write(&batch).await?;
        Ok(true)
    }
}
