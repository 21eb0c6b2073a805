//! Error types for the spark-bridge crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The target amp was not found within the scan window.
    #[error("Device not found: {name}")]
    DeviceNotFound {
        /// The advertised name that was searched for.
        name: String,
    },

    /// Failed to establish a connection to the amp.
    #[error("Connection failed: {reason}")]
    ConnectFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The expected service is absent from the connected device.
    ///
    /// This indicates the wrong peripheral or wrong firmware and is fatal
    /// for the session: retrying the same device cannot succeed.
    #[error("Service mismatch: expected service {uuid} not found")]
    ServiceMismatch {
        /// The UUID of the service that was expected.
        uuid: String,
    },

    /// A required characteristic is absent from the expected service.
    ///
    /// Fatal for the session, like [`Error::ServiceMismatch`].
    #[error("Characteristic not found: {uuid}")]
    CharacteristicMissing {
        /// The UUID of the characteristic that was expected.
        uuid: String,
    },

    /// Operation requires an active connection but there is none.
    #[error("Not connected")]
    NotConnected,

    /// A read was attempted with nothing available.
    ///
    /// Callers must check `available()` before reading.
    #[error("Read attempted on empty buffer")]
    Underflow,

    /// Serial port error from the underlying serial library.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error on a stream transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested operation is not supported on this platform.
    #[error("Operation not supported: {operation}")]
    NotSupported {
        /// Description of the unsupported operation.
        operation: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
