//! BLE Service and Characteristic UUIDs.
//!
//! The Spark amp exposes a single vendor service with one writable
//! characteristic (host to amp) and one notifying characteristic (amp to
//! host). These identifiers are fixed by the amp firmware.

use uuid::Uuid;

/// Spark amp serial service UUID.
pub const SPARK_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_ffc0_0000_1000_8000_00805f9b34fb);
/// Sender characteristic UUID (write without response, host to amp).
pub const SPARK_SENDER_UUID: Uuid = Uuid::from_u128(0x0000_ffc1_0000_1000_8000_00805f9b34fb);
/// Receiver characteristic UUID (notifications, amp to host).
pub const SPARK_RECEIVER_UUID: Uuid = Uuid::from_u128(0x0000_ffc2_0000_1000_8000_00805f9b34fb);

/// Check if a service UUID is the Spark serial service.
pub fn is_spark_service(uuid: &Uuid) -> bool {
    *uuid == SPARK_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert!(SPARK_SERVICE_UUID.to_string().contains("ffc0"));
        assert!(SPARK_SENDER_UUID.to_string().contains("ffc1"));
        assert!(SPARK_RECEIVER_UUID.to_string().contains("ffc2"));
    }

    #[test]
    fn test_is_spark_service() {
        assert!(is_spark_service(&SPARK_SERVICE_UUID));
        assert!(!is_spark_service(&SPARK_SENDER_UUID));
    }
}
