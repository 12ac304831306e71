//! Barcode scanners, one serial line per room

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use detlink_core::FrameAssembler;
use detlink_transport::{
    Error as TransportError, LineEvent, PortFault, PortFaultKind, ProbeResult, ReceiveHandler,
    SerialChannel, SerialDriver, SystemSerialDriver,
};
use detlink_types::{ConnectionStatusChanged, DeviceEvent, RoomConfig, RoomId, ScanEvent};

use crate::error::Result;
use crate::EVENT_CAPACITY;

const DEFAULT_POLL: Duration = Duration::from_millis(100);
const DEFAULT_AUTO_CONNECT_DELAY: Duration = Duration::from_millis(200);

/// State of one open room
struct RoomChannel {
    generation: u64,
    room_name: String,
    port_name: String,
    assembler: FrameAssembler,
    /// `None` while the line is being opened
    channel: Option<SerialChannel>,
    /// Scans completed before the open was announced
    pending: Vec<ScanEvent>,
    /// Why the reader stopped, once it has
    lost: Option<String>,
}

impl RoomChannel {
    fn is_connected(&self) -> bool {
        self.lost.is_none() && self.channel.as_ref().is_some_and(SerialChannel::is_connected)
    }
}

/// How a freshly opened channel ended up
enum Install {
    Live,
    /// The reader reported a loss before the open finished
    Died(SerialChannel, String),
    /// Another open for the same room replaced this one
    Superseded(SerialChannel),
}

type RoomMap = HashMap<RoomId, RoomChannel>;

/// Outcome of [`ScannerManager::auto_connect_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoConnectSummary {
    pub connected: Vec<RoomId>,
    pub failed: Vec<RoomId>,
    /// Disabled or without a port
    pub skipped: Vec<RoomId>,
}

/// Owns the scanner lines of all rooms
///
/// Completed scans and connection changes are published as [`DeviceEvent`]s;
/// see [`subscribe`](Self::subscribe).
///
/// # Examples
///
/// ```no_run
/// use detlink::{DeviceEvent, RoomConfig, ScannerManager, SerialPortConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let scanners = ScannerManager::new();
///     let mut events = scanners.subscribe();
///
///     let rooms = vec![RoomConfig::new(1, "Inspection 1", SerialPortConfig::new("COM3"))];
///     scanners.auto_connect_all(&rooms).await;
///
///     while let Ok(event) = events.recv().await {
///         if let DeviceEvent::Scan(scan) = event {
///             println!("{}", scan);
///         }
///     }
/// }
/// ```
pub struct ScannerManager {
    driver: Arc<dyn SerialDriver>,
    rooms: Arc<Mutex<RoomMap>>,
    events: broadcast::Sender<DeviceEvent>,
    next_generation: AtomicU64,
    /// Rooms already reported for a fault retrying cannot fix
    reported: Mutex<HashSet<RoomId>>,
    poll: Duration,
    auto_connect_delay: Duration,
}

impl ScannerManager {
    /// Manager using the operating system's serial ports
    pub fn new() -> Self {
        Self::with_driver(Arc::new(SystemSerialDriver))
    }

    pub fn with_driver(driver: Arc<dyn SerialDriver>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            driver,
            rooms: Arc::new(Mutex::new(HashMap::new())),
            events,
            next_generation: AtomicU64::new(1),
            reported: Mutex::new(HashSet::new()),
            poll: DEFAULT_POLL,
            auto_connect_delay: DEFAULT_AUTO_CONNECT_DELAY,
        }
    }

    /// Pause between rooms in [`auto_connect_all`](Self::auto_connect_all)
    pub fn with_auto_connect_delay(mut self, delay: Duration) -> Self {
        self.auto_connect_delay = delay;
        self
    }

    /// Longest a serial read waits before checking for close
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Publish on an existing event channel, e.g. the PLC link's
    pub fn with_event_sender(mut self, events: broadcast::Sender<DeviceEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Open the room's line, replacing any line already open for it
    ///
    /// Failures are logged and reported as `false`; they do not publish a
    /// status change.
    pub async fn open(&self, room: &RoomConfig) -> bool {
        match self.try_open(room).await {
            Ok(()) => true,
            Err(e) => {
                self.report_open_failure(room, &e);
                false
            }
        }
    }

    /// Like [`open`](Self::open), returning the reason of a failure
    pub async fn try_open(&self, room: &RoomConfig) -> Result<()> {
        let room_id = room.room_id;

        if self.close_room(room_id, "closed for reconnect").await {
            debug!("Room {} replaced its open line", room_id);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.rooms.lock().insert(
            room_id,
            RoomChannel {
                generation,
                room_name: room.room_name.clone(),
                port_name: room.serial.port_name.clone(),
                assembler: FrameAssembler::new(),
                channel: None,
                pending: Vec::new(),
                lost: None,
            },
        );

        let opened = SerialChannel::open(
            self.driver.as_ref(),
            &room.serial,
            self.poll,
            self.receive_handler(room_id, generation),
        );

        let channel = match opened {
            Ok(channel) => channel,
            Err(e) => {
                let mut rooms = self.rooms.lock();
                if rooms.get(&room_id).is_some_and(|r| r.generation == generation) {
                    rooms.remove(&room_id);
                }
                return Err(e.into());
            }
        };

        // Announced under the map lock, so the reader cannot report a loss
        // or a scan ahead of it
        let install = {
            let mut rooms = self.rooms.lock();
            match rooms.get_mut(&room_id) {
                Some(entry) if entry.generation == generation => match entry.lost.take() {
                    Some(reason) => {
                        rooms.remove(&room_id);
                        Install::Died(channel, reason)
                    }
                    None => {
                        entry.channel = Some(channel);
                        info!("Room {} ({}) connected on {}", room_id, room.room_name, room.serial);
                        self.publish(ConnectionStatusChanged::room(
                            room_id,
                            true,
                            format!("{} open", room.serial.port_name),
                        ));
                        for scan in entry.pending.drain(..) {
                            let _ = self.events.send(scan.into());
                        }
                        Install::Live
                    }
                },
                _ => Install::Superseded(channel),
            }
        };

        match install {
            Install::Live => {
                self.reported.lock().remove(&room_id);
                Ok(())
            }
            Install::Died(mut channel, reason) => {
                channel.close().await;
                Err(TransportError::PortUnavailable(PortFault::new(
                    &room.serial.port_name,
                    PortFaultKind::Other,
                    format!("line lost while opening: {}", reason),
                ))
                .into())
            }
            Install::Superseded(mut orphan) => {
                debug!("Discarding superseded line {} for room {}", orphan.port_name(), room_id);
                orphan.close().await;
                Ok(())
            }
        }
    }

    /// Close a room's line and discard its buffered bytes
    ///
    /// Returns `false` if the room was not open.
    pub async fn close(&self, room_id: RoomId) -> bool {
        self.close_room(room_id, "closed").await
    }

    async fn close_room(&self, room_id: RoomId, reason: &str) -> bool {
        let Some(mut entry) = self.rooms.lock().remove(&room_id) else {
            return false;
        };

        let was_connected = entry.is_connected();
        if !entry.assembler.buffered().is_empty() {
            debug!(
                "Room {} dropping {} unterminated chars",
                room_id,
                entry.assembler.buffered().len()
            );
        }
        if let Some(channel) = entry.channel.as_mut() {
            channel.close().await;
        }

        if was_connected {
            info!("Room {} ({}) {}", room_id, entry.room_name, reason);
            self.publish(ConnectionStatusChanged::room(
                room_id,
                false,
                format!("{} {}", entry.port_name, reason),
            ));
        }
        true
    }

    /// Try the room's port without keeping it open
    pub fn test_connection(&self, room: &RoomConfig) -> ProbeResult {
        if self.is_connected(room.room_id) {
            return ProbeResult::ok(format!("{} is open for room {}", room.serial.port_name, room.room_id));
        }
        let probe = SerialChannel::test_connection(self.driver.as_ref(), &room.serial);
        debug!("Probe of room {}: {}", room.room_id, probe);
        probe
    }

    /// The room's line is open and its reader is alive
    pub fn is_connected(&self, room_id: RoomId) -> bool {
        self.rooms
            .lock()
            .get(&room_id)
            .is_some_and(RoomChannel::is_connected)
    }

    /// Rooms with a live line, ascending
    pub fn connected_rooms(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self
            .rooms
            .lock()
            .iter()
            .filter(|(_, room)| room.is_connected())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Open every enabled room with a port, one after another
    ///
    /// A failing room does not stop the others. Attempts are spaced by the
    /// auto-connect delay.
    pub async fn auto_connect_all(&self, rooms: &[RoomConfig]) -> AutoConnectSummary {
        let mut summary = AutoConnectSummary::default();
        let mut attempted = false;

        for room in rooms {
            if !room.should_auto_connect() {
                trace!("Room {} skipped (disabled or no port)", room.room_id);
                summary.skipped.push(room.room_id);
                continue;
            }

            if attempted && !self.auto_connect_delay.is_zero() {
                tokio::time::sleep(self.auto_connect_delay).await;
            }
            attempted = true;

            if self.open(room).await {
                summary.connected.push(room.room_id);
            } else {
                summary.failed.push(room.room_id);
            }
        }

        info!(
            "Auto-connect: {} connected, {} failed, {} skipped",
            summary.connected.len(),
            summary.failed.len(),
            summary.skipped.len()
        );
        summary
    }

    /// Close every room
    pub async fn shutdown(&self) {
        let mut ids: Vec<RoomId> = self.rooms.lock().keys().copied().collect();
        ids.sort_unstable();
        for room_id in ids {
            self.close(room_id).await;
        }
    }

    fn publish(&self, status: ConnectionStatusChanged) {
        // No subscribers is fine
        let _ = self.events.send(status.into());
    }

    fn report_open_failure(&self, room: &RoomConfig, e: &crate::Error) {
        let permanent = match e {
            crate::Error::Transport(t) => t.port_fault().is_some_and(|f| f.is_permanent()),
            _ => false,
        };

        if permanent && self.reported.lock().insert(room.room_id) {
            error!(
                "Room {} ({}) cannot use {}: {}",
                room.room_id, room.room_name, room.serial.port_name, e
            );
        } else {
            warn!("Room {} ({}) failed to open: {}", room.room_id, room.room_name, e);
        }
    }

    fn receive_handler(&self, room_id: RoomId, generation: u64) -> ReceiveHandler {
        let rooms: Weak<Mutex<RoomMap>> = Arc::downgrade(&self.rooms);
        let events = self.events.clone();

        Arc::new(move |event: LineEvent<'_>| {
            let Some(rooms) = rooms.upgrade() else {
                return;
            };

            // Events go out under the lock to keep each room's order
            let mut rooms = rooms.lock();
            let Some(room) = rooms
                .get_mut(&room_id)
                .filter(|room| room.generation == generation)
            else {
                trace!("Room {} ignoring a replaced line", room_id);
                return;
            };

            match event {
                LineEvent::Data(bytes) => {
                    for payload in room.assembler.feed(bytes) {
                        let scan = ScanEvent::new(room_id, room.room_name.clone(), payload);
                        debug!("{}", scan);
                        if room.channel.is_some() {
                            let _ = events.send(scan.into());
                        } else {
                            room.pending.push(scan);
                        }
                    }
                }
                LineEvent::Lost(reason) => {
                    room.lost = Some(reason.to_string());
                    if room.channel.is_none() {
                        debug!("Room {} line died while opening: {}", room_id, reason);
                        return;
                    }

                    warn!("Room {} lost {}: {}", room_id, room.port_name, reason);
                    let _ = events.send(
                        ConnectionStatusChanged::room(
                            room_id,
                            false,
                            format!("{} lost: {}", room.port_name, reason),
                        )
                        .into(),
                    );
                }
            }
        })
    }
}

impl Default for ScannerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScannerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerManager")
            .field("rooms", &self.connected_rooms())
            .field("poll", &self.poll)
            .field("auto_connect_delay", &self.auto_connect_delay)
            .finish()
    }
}
