//! BLE communication module.
//!
//! Discovery, connection, and the GATT write/notify link to the amp.

pub mod scanner;
pub mod transport;
pub mod uuids;

pub use scanner::SparkScanner;
pub use transport::{BleState, BleTransport};
pub use uuids::*;
