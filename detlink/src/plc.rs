//! PLC link over S7 communication

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, trace, warn};

use detlink_core::constants::{tsap, DEFAULT_TIMEOUT_MS, MAX_BYTE_OFFSET, REQUESTED_PDU_SIZE};
use detlink_core::packet::ConnectParams;
use detlink_core::value as codec;
use detlink_core::{address, ConnectionState, Coordinate, Cotp, ItemAddress, Packet, Session};
use detlink_transport::{TcpTransport, Transport};
use detlink_types::{ConnectionStatusChanged, CpuModel, DeviceEvent, PlcConfig};

use crate::error::{Error, Result, TransportFault};
use crate::EVENT_CAPACITY;

/// Builds the transport for one connect attempt
pub type Connector = Arc<dyn Fn(&PlcConfig, Duration) -> Box<dyn Transport> + Send + Sync>;

/// TSAP pair (local, remote) for a CPU model
///
/// # Errors
///
/// Returns [`Error::ModelMismatch`] if rack or slot are out of range for a
/// rack/slot addressed model.
pub fn tsap_for(model: CpuModel, rack: u8, slot: u8) -> Result<(u16, u16)> {
    match model {
        CpuModel::S7200 => Ok((tsap::S7_200_LOCAL, tsap::S7_200_REMOTE)),
        CpuModel::S7200Smart => Ok((tsap::S7_200_SMART_LOCAL, tsap::S7_200_SMART_REMOTE)),
        CpuModel::Logo0BA8 => Ok((tsap::LOGO_LOCAL, tsap::LOGO_REMOTE)),
        _ => {
            if rack > tsap::MAX_RACK || slot > tsap::MAX_SLOT {
                return Err(Error::ModelMismatch(format!(
                    "rack {} slot {} out of range for {}",
                    rack, slot, model
                )));
            }
            let remote = tsap::RACK_SLOT_BASE | ((rack as u16) << 5) | slot as u16;
            Ok((tsap::PG, remote))
        }
    }
}

/// Connection to one PLC
///
/// Cloning is cheap; all clones share the connection. Every operation holds
/// the connection for its whole exchange, so concurrent callers are
/// serialized and [`write_bool`](Self::write_bool) never loses updates to
/// neighbouring bits.
///
/// # Examples
///
/// ```no_run
/// use detlink::{CpuModel, PlcLink};
///
/// #[tokio::main]
/// async fn main() -> detlink::Result<()> {
///     let plc = PlcLink::new();
///
///     if !plc.connect("192.168.0.10", CpuModel::S71200, 0, 1).await {
///         eprintln!("PLC offline: {}", plc.status_text());
///         return Ok(());
///     }
///
///     let speed = plc.read_float("DB1.DBD4").await?;
///     plc.write_bool("DB1.DBX0.3", true).await?;
///     println!("speed = {}", speed);
///
///     plc.disconnect().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct PlcLink {
    transport: Arc<Mutex<Option<Box<dyn Transport>>>>,
    session: Session,
    status: Arc<parking_lot::RwLock<String>>,
    events: broadcast::Sender<DeviceEvent>,
    connector: Connector,
    timeout: Duration,
}

impl PlcLink {
    /// Create a disconnected link using ISO-on-TCP
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport: Arc::new(Mutex::new(None)),
            session: Session::new(),
            status: Arc::new(parking_lot::RwLock::new("not connected".to_string())),
            events,
            connector: Arc::new(|config: &PlcConfig, timeout: Duration| {
                Box::new(
                    TcpTransport::iso_on_tcp(&config.host)
                        .with_connect_timeout(timeout)
                        .with_write_timeout(timeout),
                ) as Box<dyn Transport>
            }),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Set the bound on every exchange (default 5000 ms)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a custom transport, e.g. a simulated PLC
    pub fn with_connector<F>(mut self, connector: F) -> Self
    where
        F: Fn(&PlcConfig, Duration) -> Box<dyn Transport> + Send + Sync + 'static,
    {
        self.connector = Arc::new(connector);
        self
    }

    /// Publish status changes on an existing event channel
    pub fn with_event_sender(mut self, events: broadcast::Sender<DeviceEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn event_sender(&self) -> broadcast::Sender<DeviceEvent> {
        self.events.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Description of the last transition or failure
    pub fn status_text(&self) -> String {
        self.status.read().clone()
    }

    /// Negotiated PDU size of the current session
    pub fn pdu_size(&self) -> u16 {
        self.session.pdu_size()
    }

    /// Connect to a PLC
    ///
    /// Never fails with an error: the outcome is the returned flag and the
    /// classified [`status_text`](Self::status_text). An existing connection
    /// is closed first. No retries are made.
    pub async fn connect(&self, host: &str, model: CpuModel, rack: u8, slot: u8) -> bool {
        self.connect_with(&PlcConfig::new(host, model, rack, slot)).await
    }

    pub async fn connect_with(&self, config: &PlcConfig) -> bool {
        let mut conn = self.transport.lock().await;

        if self.session.state() != ConnectionState::Disconnected {
            self.close_locked(&mut conn, "reconnecting").await;
        }

        // Only fails when the state was not reset above
        if let Err(e) = self.session.begin_connect() {
            warn!("Cannot start PLC connect: {}", e);
            return false;
        }

        info!(
            "Connecting to PLC {} ({}, rack {}, slot {})...",
            config.host, config.cpu_model, config.rack, config.slot
        );

        let mut transport = (self.connector)(config, self.timeout);

        match self.handshake(transport.as_mut(), config).await {
            Ok(pdu_size) => {
                if let Err(e) = self.session.establish(pdu_size) {
                    warn!("PLC session state changed during connect: {}", e);
                    let _ = transport.disconnect().await;
                    return false;
                }
                *conn = Some(transport);

                let text = format!("connected to {} ({})", config.host, config.cpu_model);
                info!("PLC {}, PDU size {}", text, pdu_size);
                self.set_status(true, text);
                true
            }
            Err(e) => {
                let fault = TransportFault::classify(&e);
                warn!("PLC connect to {} failed: {} ({})", config.host, fault, e);

                if let Err(close) = transport.disconnect().await {
                    debug!("Ignoring close error after failed connect: {}", close);
                }
                self.session.fail(fault.to_string());
                *self.status.write() = fault.to_string();
                false
            }
        }
    }

    /// Close the connection; errors while closing are ignored
    pub async fn disconnect(&self) {
        let mut conn = self.transport.lock().await;
        self.close_locked(&mut conn, "disconnected").await;
    }

    async fn handshake(&self, transport: &mut dyn Transport, config: &PlcConfig) -> Result<u16> {
        let (local, remote) = tsap_for(config.cpu_model, config.rack, config.slot)?;

        transport.connect().await?;

        debug!("COTP connect, TSAP {:04X} -> {:04X}", local, remote);
        transport
            .send(&Cotp::ConnectRequest(ConnectParams::new(local, remote)).encode())
            .await?;

        let frame = match transport.receive(self.timeout).await {
            Ok(frame) => frame,
            // S7 CPUs drop the socket when the TSAP names no reachable CPU
            Err(detlink_transport::Error::ConnectionClosed) => {
                return Err(Error::ModelMismatch(format!(
                    "{} closed the connection for TSAP {:04X}",
                    config.host, remote
                )));
            }
            Err(e) => return Err(e.into()),
        };

        match Cotp::decode(frame)? {
            Cotp::ConnectConfirm(_) => {}
            Cotp::DisconnectRequest { reason } => {
                return Err(Error::ModelMismatch(format!(
                    "{} refused TSAP {:04X} (reason 0x{:02X})",
                    config.host, remote, reason
                )));
            }
            other => {
                return Err(detlink_core::Error::MalformedResponse(format!(
                    "expected connect confirm, got {:?}",
                    other
                ))
                .into());
            }
        }

        let request = Packet::setup_communication(self.session.next_pdu_ref(), REQUESTED_PDU_SIZE);
        let reply = exchange(transport, &request, self.timeout).await?;
        let negotiated = reply.negotiated_pdu_size()?;

        if Packet::max_read_payload(negotiated) == 0 || Packet::max_write_payload(negotiated) == 0 {
            return Err(detlink_core::Error::MalformedResponse(format!(
                "negotiated PDU size {} is too small",
                negotiated
            ))
            .into());
        }

        debug!("Setup communication done, PDU size {}", negotiated);
        Ok(negotiated.min(REQUESTED_PDU_SIZE))
    }

    async fn close_locked(&self, conn: &mut Option<Box<dyn Transport>>, reason: &str) {
        let was_connected = self.session.is_connected();

        if let Some(mut transport) = conn.take() {
            debug!("Closing PLC transport to {}", transport.remote_addr());
            if let Err(e) = transport.disconnect().await {
                debug!("Ignoring close error: {}", e);
            }
        }
        self.session.close();

        if was_connected {
            info!("PLC {}", reason);
            self.set_status(false, reason);
        } else {
            *self.status.write() = reason.to_string();
        }
    }

    fn set_status(&self, connected: bool, text: impl Into<String>) {
        let text = text.into();
        *self.status.write() = text.clone();
        // No subscribers is fine
        let _ = self.events.send(ConnectionStatusChanged::plc(connected, text).into());
    }

    /// Drop a link whose exchange failed beyond recovery
    async fn settle<T>(&self, conn: &mut Option<Box<dyn Transport>>, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.requires_reconnect() && self.session.is_connected() {
                let fault = TransportFault::classify(e);
                warn!("PLC link failed: {} ({})", fault, e);

                if let Some(mut transport) = conn.take() {
                    let _ = transport.disconnect().await;
                }
                self.session.fail(fault.to_string());
                self.set_status(false, fault.to_string());
            }
        }
        result
    }

    fn ensure_connected<'a>(
        &self,
        conn: &'a mut Option<Box<dyn Transport>>,
    ) -> Result<&'a mut Box<dyn Transport>> {
        if !self.session.is_connected() {
            return Err(Error::NotConnected);
        }
        conn.as_mut().ok_or(Error::NotConnected)
    }

    async fn read_range(
        &self,
        conn: &mut Option<Box<dyn Transport>>,
        coord: &Coordinate,
        count: usize,
    ) -> Result<Vec<u8>> {
        check_span(coord, count)?;
        let transport = self.ensure_connected(conn)?;

        let max = Packet::max_read_payload(self.session.pdu_size());
        let base = ItemAddress::for_coordinate(coord, 0);
        let mut out = Vec::with_capacity(count);

        while out.len() < count {
            let chunk = (count - out.len()).min(max);
            let item = base.slice(out.len() as u32, chunk as u16);

            let request = Packet::read_var(self.session.next_pdu_ref(), &item);
            let reply = exchange(transport.as_mut(), &request, self.timeout).await?;
            let data = reply.read_data()?;

            if data.len() != chunk {
                return Err(detlink_core::Error::MalformedResponse(format!(
                    "asked for {} bytes at {}, got {}",
                    chunk,
                    coord,
                    data.len()
                ))
                .into());
            }
            out.extend_from_slice(&data);
        }

        trace!("Read {} bytes at {}", out.len(), coord);
        Ok(out)
    }

    async fn write_range(
        &self,
        conn: &mut Option<Box<dyn Transport>>,
        coord: &Coordinate,
        bytes: &[u8],
    ) -> Result<()> {
        check_span(coord, bytes.len())?;
        let transport = self.ensure_connected(conn)?;

        let max = Packet::max_write_payload(self.session.pdu_size());
        let base = ItemAddress::for_coordinate(coord, 0);

        for (index, chunk) in bytes.chunks(max).enumerate() {
            let item = base.slice((index * max) as u32, chunk.len() as u16);

            let request = Packet::write_var(self.session.next_pdu_ref(), &item, chunk);
            let reply = exchange(transport.as_mut(), &request, self.timeout).await?;
            reply.write_result()?;
        }

        trace!("Wrote {} bytes at {}", bytes.len(), coord);
        Ok(())
    }

    /// Read `count` bytes starting at the address's byte
    ///
    /// Requests larger than one PDU are split into several jobs.
    pub async fn read_bytes(&self, address: &str, count: usize) -> Result<Vec<u8>> {
        let coord = address::parse(address)?;
        let mut conn = self.transport.lock().await;
        let result = self.read_range(&mut conn, &coord, count).await;
        self.settle(&mut conn, result).await
    }

    pub async fn read_byte(&self, address: &str) -> Result<u8> {
        let bytes = self.read_bytes(address, 1).await?;
        Ok(codec::decode_u8(&bytes)?)
    }

    /// Read the addressed bit (bit 0 if the address names none)
    pub async fn read_bool(&self, address: &str) -> Result<bool> {
        let coord = address::parse(address)?;
        let mut conn = self.transport.lock().await;
        let result = self.read_range(&mut conn, &coord, 1).await;
        let bytes = self.settle(&mut conn, result).await?;
        Ok(codec::get_bit(codec::decode_u8(&bytes)?, coord.bit_offset()))
    }

    pub async fn read_short(&self, address: &str) -> Result<i16> {
        let bytes = self.read_bytes(address, 2).await?;
        Ok(codec::decode_i16(&bytes)?)
    }

    pub async fn read_int(&self, address: &str) -> Result<i32> {
        let bytes = self.read_bytes(address, 4).await?;
        Ok(codec::decode_i32(&bytes)?)
    }

    pub async fn read_float(&self, address: &str) -> Result<f32> {
        let bytes = self.read_bytes(address, 4).await?;
        Ok(codec::decode_f32(&bytes)?)
    }

    /// Set or clear one bit, leaving the other bits of the byte untouched
    pub async fn write_bool(&self, address: &str, value: bool) -> Result<()> {
        let coord = address::parse(address)?;
        let mut conn = self.transport.lock().await;

        let result = async {
            let current = self.read_range(&mut conn, &coord, 1).await?;
            let updated = codec::set_bit(codec::decode_u8(&current)?, coord.bit_offset(), value);
            self.write_range(&mut conn, &coord, &[updated]).await
        }
        .await;

        self.settle(&mut conn, result).await
    }

    pub async fn write_bytes(&self, address: &str, bytes: &[u8]) -> Result<()> {
        let coord = address::parse(address)?;
        let mut conn = self.transport.lock().await;
        let result = self.write_range(&mut conn, &coord, bytes).await;
        self.settle(&mut conn, result).await
    }

    pub async fn write_byte(&self, address: &str, value: u8) -> Result<()> {
        self.write_bytes(address, &[value]).await
    }

    pub async fn write_short(&self, address: &str, value: i16) -> Result<()> {
        self.write_bytes(address, &codec::encode_i16(value)).await
    }

    pub async fn write_int(&self, address: &str, value: i32) -> Result<()> {
        self.write_bytes(address, &codec::encode_i32(value)).await
    }

    pub async fn write_float(&self, address: &str, value: f32) -> Result<()> {
        self.write_bytes(address, &codec::encode_f32(value)).await
    }
}

/// Send one job and wait for the reply that answers it
/// Range must stay inside the 24-bit byte address space
fn check_span(coord: &Coordinate, count: usize) -> Result<()> {
    let available = (MAX_BYTE_OFFSET as usize + 1).saturating_sub(coord.byte as usize);
    if count > available {
        return Err(detlink_core::Error::PayloadTooLarge {
            size: count,
            max: available,
        }
        .into());
    }
    Ok(())
}

async fn exchange(transport: &mut dyn Transport, request: &Packet, timeout: Duration) -> Result<Packet> {
    trace!("Sending: {:?}", request);
    transport.send(&request.into_frame()).await?;

    let frame = transport.receive(timeout).await?;
    let payload = match Cotp::decode(frame)? {
        Cotp::Data(payload) => payload,
        Cotp::DisconnectRequest { reason } => {
            debug!("PLC sent disconnect request (reason 0x{:02X})", reason);
            return Err(detlink_transport::Error::ConnectionClosed.into());
        }
        other => {
            return Err(detlink_core::Error::MalformedResponse(format!(
                "expected data unit, got {:?}",
                other
            ))
            .into());
        }
    };

    let reply = Packet::decode(payload)?;
    trace!("Received: {:?}", reply);

    if reply.pdu_ref != request.pdu_ref {
        return Err(detlink_core::Error::InvalidPduReference {
            expected: request.pdu_ref,
            actual: reply.pdu_ref,
        }
        .into());
    }
    Ok(reply)
}

impl Default for PlcLink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlcLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlcLink")
            .field("state", &self.session.state())
            .field("status", &self.status_text())
            .field("timeout", &self.timeout)
            .finish()
    }
}
