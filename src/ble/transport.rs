//! The BLE transport: connection state machine, link handles, and the
//! notification-to-buffer bridge.
//!
//! Connection loss is expected and recoverable: the machine re-enters
//! `Scanning` after a disconnect. Only a service or characteristic
//! mismatch is fatal, since retrying the same peripheral cannot fix wrong
//! firmware.

use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::ble::scanner::SparkScanner;
use crate::ble::uuids::{
    is_spark_service, SPARK_RECEIVER_UUID, SPARK_SENDER_UUID, SPARK_SERVICE_UUID,
};
use crate::buffer::RingBuffer;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Connection state of the BLE transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BleState {
    /// Nothing has happened yet.
    #[default]
    Idle,
    /// Scanning advertisements for the target name.
    Scanning,
    /// Opening a client connection to the discovered device.
    Connecting,
    /// Looking for the amp's serial service.
    DiscoveringService,
    /// Looking for the sender and receiver characteristics.
    DiscoveringCharacteristics,
    /// Registering for receiver notifications.
    Subscribing,
    /// Link established; reads and writes are valid.
    Active,
    /// Link lost; writes fail until the machine rescans.
    Disconnected,
}

impl BleState {
    /// Whether the transport accepts reads and writes.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether `to` is a legal successor of this state.
    ///
    /// Encodes the connect sequence plus its failure edges: connect and
    /// subscribe failures fall back to `Scanning`, a firmware mismatch
    /// lands in `Disconnected`, and `Disconnected` may rescan.
    pub fn can_transition(&self, to: BleState) -> bool {
        use BleState::*;
        matches!(
            (*self, to),
            (Idle, Scanning)
                | (Scanning, Scanning)
                | (Scanning, Connecting)
                | (Connecting, DiscoveringService)
                | (Connecting, Scanning)
                | (DiscoveringService, DiscoveringCharacteristics)
                | (DiscoveringService, Disconnected)
                | (DiscoveringService, Scanning)
                | (DiscoveringCharacteristics, Subscribing)
                | (DiscoveringCharacteristics, Disconnected)
                | (Subscribing, Active)
                | (Subscribing, Scanning)
                | (Active, Disconnected)
                | (Disconnected, Scanning)
        )
    }
}

impl std::fmt::Display for BleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::Connecting => "Connecting",
            Self::DiscoveringService => "DiscoveringService",
            Self::DiscoveringCharacteristics => "DiscoveringCharacteristics",
            Self::Subscribing => "Subscribing",
            Self::Active => "Active",
            Self::Disconnected => "Disconnected",
        };
        write!(f, "{}", name)
    }
}

/// Handles for one established link.
///
/// Created during the connect sequence, reset to `None` on disconnect; at
/// most one live instance exists since there is a single target amp.
#[derive(Clone)]
struct ActiveLink {
    peripheral: Peripheral,
    sender: Characteristic,
    receiver: Characteristic,
}

/// State shared between the main flow and the stack-driven tasks.
///
/// The notification listener is the exclusive producer into `buffer`; the
/// transport's read path is the exclusive consumer. Locks are held for a
/// single push or pop, never across an await.
struct LinkState {
    state: RwLock<BleState>,
    link: RwLock<Option<ActiveLink>>,
    buffer: Mutex<RingBuffer>,
}

impl LinkState {
    fn new(buffer_capacity: usize) -> Self {
        Self {
            state: RwLock::new(BleState::Idle),
            link: RwLock::new(None),
            buffer: Mutex::new(RingBuffer::with_capacity(buffer_capacity)),
        }
    }

    fn state(&self) -> BleState {
        *self.state.read()
    }

    fn set_state(&self, new_state: BleState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };
        if old_state != new_state {
            debug!("BLE state changed: {} -> {}", old_state, new_state);
            if !old_state.can_transition(new_state) {
                warn!("Unexpected BLE transition: {} -> {}", old_state, new_state);
            }
        }
    }

    /// Notification callback duty: push the delivered bytes and nothing else.
    fn push_inbound(&self, data: &[u8]) {
        let mut buffer = self.buffer.lock();
        let accepted = buffer.push(data);
        if accepted < data.len() {
            warn!(
                "Ring buffer full, dropped {} bytes ({} dropped total)",
                data.len() - accepted,
                buffer.overflow_count()
            );
        }
    }

    fn available(&self) -> usize {
        self.buffer.lock().len()
    }

    fn read_byte(&self) -> Result<u8> {
        self.buffer.lock().pop()
    }

    /// Fetch the link handles for a write, enforcing the `Active` gate.
    fn begin_write(&self) -> Result<ActiveLink> {
        if !self.state().is_active() {
            return Err(Error::NotConnected);
        }
        self.link.read().clone().ok_or(Error::NotConnected)
    }

    /// Drop the link handles and leave `Disconnected`.
    ///
    /// The buffer is intentionally not cleared: bytes received before the
    /// disconnect stay drainable.
    fn mark_disconnected(&self) {
        *self.link.write() = None;
        self.set_state(BleState::Disconnected);
    }
}

/// Locate the sender and receiver characteristics on the amp.
///
/// Pure lookup over the discovered services so the firmware-mismatch
/// paths can be exercised without a radio.
fn resolve_link_characteristics(
    services: impl IntoIterator<Item = btleplug::api::Service>,
) -> Result<(Characteristic, Characteristic)> {
    let service = services
        .into_iter()
        .find(|s| is_spark_service(&s.uuid))
        .ok_or_else(|| Error::ServiceMismatch {
            uuid: SPARK_SERVICE_UUID.to_string(),
        })?;

    let find = |uuid: uuid::Uuid| {
        service
            .characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicMissing {
                uuid: uuid.to_string(),
            })
    };

    let sender = find(SPARK_SENDER_UUID)?;
    let receiver = find(SPARK_RECEIVER_UUID)?;
    Ok((sender, receiver))
}

/// BLE transport to the amp.
#[derive(Clone)]
pub struct BleTransport {
    scanner: Arc<SparkScanner>,
    shared: Arc<LinkState>,
    write_chunk_size: usize,
    scan_window: Duration,
    /// Whether to rescan after a disconnect.
    reconnect: Arc<AtomicBool>,
    disconnect_signal: Arc<Notify>,
    supervisor_running: Arc<AtomicBool>,
    notify_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
    watcher_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl BleTransport {
    /// Create a BLE transport on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(config: &BridgeConfig) -> Result<Self> {
        let scanner = SparkScanner::new(config.device_name.clone()).await?;
        Ok(Self::with_scanner(scanner, config))
    }

    /// Create a BLE transport with an existing scanner.
    pub fn with_scanner(scanner: SparkScanner, config: &BridgeConfig) -> Self {
        Self {
            scanner: Arc::new(scanner),
            shared: Arc::new(LinkState::new(config.buffer_capacity)),
            write_chunk_size: config.write_chunk_size,
            scan_window: config.scan_window,
            reconnect: Arc::new(AtomicBool::new(false)),
            disconnect_signal: Arc::new(Notify::new()),
            supervisor_running: Arc::new(AtomicBool::new(false)),
            notify_handle: Arc::new(RwLock::new(None)),
            watcher_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Current state of the connection machine.
    pub fn state(&self) -> BleState {
        self.shared.state()
    }

    /// Total bytes dropped on buffer overflow since startup.
    pub fn overflow_count(&self) -> u64 {
        self.shared.buffer.lock().overflow_count()
    }

    /// Tear the link down and stop rescanning.
    pub async fn disconnect(&self) -> Result<()> {
        self.reconnect.store(false, Ordering::SeqCst);

        let link = self.shared.link.read().clone();
        self.shared.mark_disconnected();

        if let Some(handle) = self.notify_handle.write().take() {
            handle.abort();
        }
        if let Some(handle) = self.watcher_handle.write().take() {
            handle.abort();
        }

        if let Some(link) = link {
            link.peripheral.disconnect().await.map_err(Error::Bluetooth)?;
            info!("Disconnected from amp");
        }
        Ok(())
    }

    /// Run the connect sequence until the link is `Active`.
    ///
    /// Discovery and connection failures retry by rescanning; only a
    /// firmware mismatch returns an error.
    async fn establish(&self) -> Result<()> {
        loop {
            self.shared.set_state(BleState::Scanning);
            let peripheral = loop {
                match self.scanner.find_target(self.scan_window).await? {
                    Some(p) => break p,
                    None => {
                        // Target not seen this window; keep scanning.
                        self.shared.set_state(BleState::Scanning);
                    }
                }
            };

            self.shared.set_state(BleState::Connecting);
            if let Err(e) = peripheral.connect().await {
                warn!("Connection failed: {}, rescanning", e);
                continue;
            }

            self.shared.set_state(BleState::DiscoveringService);
            if let Err(e) = peripheral.discover_services().await {
                warn!("Service discovery failed: {}, rescanning", e);
                let _ = peripheral.disconnect().await;
                continue;
            }

            self.shared.set_state(BleState::DiscoveringCharacteristics);
            let (sender, receiver) = match resolve_link_characteristics(peripheral.services()) {
                Ok(pair) => pair,
                Err(e) => {
                    // Wrong peripheral firmware; fatal for this session.
                    error!("Amp firmware mismatch: {}", e);
                    self.shared.set_state(BleState::Disconnected);
                    let _ = peripheral.disconnect().await;
                    return Err(e);
                }
            };

            self.shared.set_state(BleState::Subscribing);
            if let Err(e) = peripheral.subscribe(&receiver).await {
                warn!("Subscribe failed: {}, rescanning", e);
                let _ = peripheral.disconnect().await;
                continue;
            }

            self.start_notification_listener(&peripheral).await?;
            self.start_disconnect_watcher(&peripheral).await?;

            *self.shared.link.write() = Some(ActiveLink {
                peripheral,
                sender,
                receiver,
            });
            self.shared.set_state(BleState::Active);
            info!("BLE link active");
            return Ok(());
        }
    }

    /// Forward receiver notifications into the ring buffer.
    async fn start_notification_listener(&self, peripheral: &Peripheral) -> Result<()> {
        let mut notifications = peripheral.notifications().await.map_err(Error::Bluetooth)?;
        let shared = self.shared.clone();

        let handle = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != SPARK_RECEIVER_UUID {
                    continue;
                }
                shared.push_inbound(&notification.value);
            }
            debug!("Notification stream ended");
        });

        if let Some(old) = self.notify_handle.write().replace(handle) {
            old.abort();
        }
        Ok(())
    }

    /// Watch for the radio-level disconnect event.
    async fn start_disconnect_watcher(&self, peripheral: &Peripheral) -> Result<()> {
        let mut events = self
            .scanner
            .adapter()
            .events()
            .await
            .map_err(Error::Bluetooth)?;
        let id = peripheral.id();
        let shared = self.shared.clone();
        let signal = self.disconnect_signal.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(disconnected) = event {
                    if disconnected == id {
                        warn!("Amp disconnected");
                        shared.mark_disconnected();
                        signal.notify_one();
                        break;
                    }
                }
            }
        });

        if let Some(old) = self.watcher_handle.write().replace(handle) {
            old.abort();
        }
        Ok(())
    }

    /// Spawn the reconnect supervisor once per transport.
    fn ensure_supervisor(&self) {
        if self.supervisor_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                this.disconnect_signal.notified().await;
                if !this.reconnect.load(Ordering::SeqCst) {
                    break;
                }
                info!("Connection lost, rescanning for amp");
                if let Err(e) = this.establish().await {
                    error!("Reconnect abandoned: {}", e);
                    break;
                }
            }
            this.supervisor_running.store(false, Ordering::SeqCst);
        });
    }
}

#[async_trait::async_trait]
impl Transport for BleTransport {
    async fn connect(&self) -> Result<()> {
        self.reconnect.store(true, Ordering::SeqCst);
        self.establish().await?;
        self.ensure_supervisor();
        Ok(())
    }

    fn available(&self) -> usize {
        self.shared.available()
    }

    fn read_byte(&self) -> Result<u8> {
        self.shared.read_byte()
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let link = self.shared.begin_write()?;
        // The transmission unit is negotiated by the stack; payloads are
        // split at a conservative boundary rather than a probed one.
        for chunk in data.chunks(self.write_chunk_size) {
            link.peripheral
                .write(&link.sender, chunk, WriteType::WithoutResponse)
                .await
                .map_err(Error::Bluetooth)?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().is_active()
    }
}
