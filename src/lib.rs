// Allow holding locks across await points - we use parking_lot which is designed for this
#![allow(clippy::await_holding_lock)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # spark-bridge
//!
//! A serial-to-Bluetooth bridge for Positive Grid Spark amplifiers.
//!
//! The bridge relays an opaque byte stream between a wired high-speed
//! serial link and the amp's wireless link, which is either classic
//! Bluetooth serial (RFCOMM stream) or Bluetooth Low Energy (GATT
//! write/notify). Both radios sit behind one uniform
//! `available`/`read`/`write` surface; the payload bytes are never
//! interpreted.
//!
//! ## Features
//!
//! - **Dual transport**: classic Bluetooth or BLE, selected at startup
//! - **Discovery by name**: finds the amp by its advertised name
//! - **Automatic BLE recovery**: connection loss re-enters scanning
//! - **Bounded buffering**: notification bursts land in a fixed-capacity
//!   ring buffer with explicit overflow accounting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spark_bridge::{Bridge, BridgeConfig, Result, TransportMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = BridgeConfig {
//!         mode: TransportMode::Ble,
//!         serial_port: "/dev/ttyUSB0".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let bridge = Bridge::new(&config).await?;
//!
//!     // Scan, connect, discover the serial service, subscribe.
//!     bridge.connect().await?;
//!
//!     // Relay bytes until shutdown.
//!     bridge.run().await
//! }
//! ```
//!
//! ## Platform Notes
//!
//! BLE mode works wherever btleplug does (Linux, macOS, Windows).
//! Classic mode needs BlueZ and is Linux-only.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration types

// Public modules
pub mod ble;
pub mod bridge;
pub mod buffer;
pub mod classic;
pub mod config;
pub mod error;
pub mod serial;
pub mod transport;

mod stream;

// Re-exports for convenience
pub use bridge::Bridge;
pub use buffer::RingBuffer;
pub use classic::ClassicTransport;
pub use config::{BridgeConfig, TransportMode};
pub use error::{Error, Result};
pub use serial::SerialChannel;
pub use transport::{Transport, TransportFacade};

// Re-export commonly used types from submodules
pub use ble::transport::{BleState, BleTransport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<Bridge>();
        let _ = std::any::TypeId::of::<BridgeConfig>();
        let _ = std::any::TypeId::of::<TransportMode>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<RingBuffer>();
        let _ = std::any::TypeId::of::<BleState>();
    }
}
