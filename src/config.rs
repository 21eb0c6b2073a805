//! Startup configuration for the bridge.
//!
//! All values are fixed at startup; nothing here is mutated at runtime.

use std::time::Duration;

/// Advertised name of the target amp, used for discovery in both radio modes.
pub const DEFAULT_DEVICE_NAME: &str = "Spark 40 Audio";

/// Local adapter alias, visible to the amp during classic Bluetooth pairing.
pub const DEFAULT_LOCAL_ALIAS: &str = "Heltec";

/// Baud rate of the wired serial link.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Ring buffer capacity, sized for the largest plausible burst of
/// notifications arriving before the serial side drains them.
pub const DEFAULT_BUFFER_CAPACITY: usize = 5000;

/// Default BLE write chunk size.
///
/// The real transmission unit is negotiated by the BLE stack and not
/// portably queryable, so outbound payloads are split at a conservative
/// boundary instead.
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 180;

/// Which radio transport the bridge uses.
///
/// Selected once at startup and never switched at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportMode {
    /// Classic Bluetooth serial (RFCOMM stream).
    Classic,
    /// Bluetooth Low Energy (GATT write/notify).
    #[default]
    Ble,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classic => write!(f, "Classic"),
            Self::Ble => write!(f, "BLE"),
        }
    }
}

/// Configuration for a bridge instance.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BridgeConfig {
    /// Radio transport to use.
    pub mode: TransportMode,
    /// Advertised name of the target amp.
    pub device_name: String,
    /// Local adapter alias for classic Bluetooth.
    pub local_alias: String,
    /// Path of the wired serial port.
    pub serial_port: String,
    /// Baud rate of the wired serial port.
    pub baud_rate: u32,
    /// Capacity of the BLE notification ring buffer.
    pub buffer_capacity: usize,
    /// Chunk boundary for outbound BLE writes.
    pub write_chunk_size: usize,
    /// RFCOMM channel for classic Bluetooth.
    pub classic_channel: u8,
    /// Connection attempts before classic Bluetooth gives up.
    pub classic_max_retries: u32,
    /// Delay between classic Bluetooth connection attempts.
    pub classic_retry_delay: Duration,
    /// Length of one BLE scan pass before the scan is restarted.
    pub scan_window: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            local_alias: DEFAULT_LOCAL_ALIAS.to_string(),
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            classic_channel: 1,
            classic_max_retries: 3,
            classic_retry_delay: Duration::from_secs(1),
            scan_window: Duration::from_secs(10),
        }
    }
}
