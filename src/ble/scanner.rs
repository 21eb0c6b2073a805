//! BLE scanning for the target amp.
//!
//! Scans advertisements and matches on the advertised local name. Unlike a
//! general-purpose scanner there is exactly one device of interest, so a
//! scan pass ends as soon as a match appears.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

/// Check an advertised name against the configured target.
///
/// Amps append a suffix to the base name on some firmware revisions, so a
/// prefix match is accepted as well as an exact one.
pub fn matches_target(advertised: &str, target: &str) -> bool {
    advertised == target || advertised.starts_with(target)
}

/// Scanner bound to one adapter and one target name.
pub struct SparkScanner {
    adapter: Adapter,
    target: String,
}

impl SparkScanner {
    /// Create a scanner on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(target: impl Into<String>) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self {
            adapter,
            target: target.into(),
        })
    }

    /// Create a scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter, target: impl Into<String>) -> Self {
        Self {
            adapter,
            target: target.into(),
        }
    }

    /// The adapter this scanner uses.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Run one scan pass, returning the target peripheral if it advertised
    /// within `window`.
    ///
    /// Returns `Ok(None)` when the window elapses without a match; the
    /// caller decides whether to rescan.
    pub async fn find_target(&self, window: Duration) -> Result<Option<Peripheral>> {
        debug!("Scanning for \"{}\"", self.target);

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        let result = self.scan_events(window).await;

        // Stop the scan regardless of how the pass ended.
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop scan: {}", e);
        }

        result
    }

    async fn scan_events(&self, window: Duration) -> Result<Option<Peripheral>> {
        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;
        let deadline = tokio::time::Instant::now() + window;

        loop {
            tokio::select! {
                event = events.next() => {
                    let Some(event) = event else {
                        return Ok(None);
                    };
                    if let Some(id) = Self::discovered_id(event) {
                        if let Some(peripheral) = self.check_peripheral(id).await {
                            return Ok(Some(peripheral));
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("Scan window elapsed without finding \"{}\"", self.target);
                    return Ok(None);
                }
            }
        }
    }

    /// Extract the peripheral id from events that can carry a new name.
    fn discovered_id(event: CentralEvent) -> Option<PeripheralId> {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id),
            _ => None,
        }
    }

    /// Fetch a discovered peripheral and test its advertised name.
    async fn check_peripheral(&self, id: PeripheralId) -> Option<Peripheral> {
        let peripheral = match self.adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral {:?}: {}", id, e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        let name = properties.local_name?;
        trace!("Advertisement from \"{}\"", name);

        if matches_target(&name, &self.target) {
            info!("Found \"{}\" (rssi {:?})", name, properties.rssi);
            Some(peripheral)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_target_exact() {
        assert!(matches_target("Spark 40 Audio", "Spark 40 Audio"));
    }

    #[test]
    fn test_matches_target_prefix() {
        assert!(matches_target("Spark 40 Audio BLE", "Spark 40 Audio"));
    }

    #[test]
    fn test_matches_target_rejects_others() {
        assert!(!matches_target("Spark Mini", "Spark 40 Audio"));
        assert!(!matches_target("", "Spark 40 Audio"));
        assert!(!matches_target("Audio Spark 40", "Spark 40 Audio"));
    }
}
