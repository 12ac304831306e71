//! Serial lines to barcode scanners
//!
//! The OS driver sits behind [`SerialDriver`] so scanners can be simulated
//! with in-memory lines. A [`SerialChannel`] owns one open line plus the
//! background task that reads it and hands raw bytes to a callback.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use detlink_types::{Parity, SerialPortConfig, StopBits};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace, warn};

use crate::error::{Error, PortFault, PortFaultKind, Result};

const READ_BUFFER_SIZE: usize = 1024;

/// An open serial line
pub trait SerialLine: AsyncRead + Send + Unpin {
    /// Drop whatever is pending in the driver buffers
    fn discard_buffers(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLine for SerialStream {
    fn discard_buffers(&mut self) -> io::Result<()> {
        self.clear(tokio_serial::ClearBuffer::All).map_err(io::Error::from)
    }
}

/// In-memory line, used by scanner simulators
impl SerialLine for tokio::io::DuplexStream {}

/// Opens serial lines
pub trait SerialDriver: Send + Sync {
    /// Names of the ports the OS currently knows about
    fn available_ports(&self) -> Result<Vec<String>>;

    /// Open a port with the given line parameters
    fn open(&self, config: &SerialPortConfig) -> Result<Box<dyn SerialLine>>;
}

/// Driver backed by the operating system's serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerialDriver;

impl SystemSerialDriver {
    fn data_bits(config: &SerialPortConfig) -> Result<tokio_serial::DataBits> {
        match config.data_bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(rejected(config, format!("{} data bits", other))),
        }
    }

    fn parity(config: &SerialPortConfig) -> Result<tokio_serial::Parity> {
        match config.parity {
            Parity::None => Ok(tokio_serial::Parity::None),
            Parity::Odd => Ok(tokio_serial::Parity::Odd),
            Parity::Even => Ok(tokio_serial::Parity::Even),
            Parity::Mark | Parity::Space => Err(rejected(
                config,
                format!("{} parity is not supported by the driver", config.parity),
            )),
        }
    }

    fn stop_bits(stop_bits: StopBits) -> tokio_serial::StopBits {
        match stop_bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

fn rejected(config: &SerialPortConfig, detail: impl Into<String>) -> Error {
    Error::PortUnavailable(PortFault::parameter_rejected(&config.port_name, detail))
}

impl SerialDriver for SystemSerialDriver {
    fn available_ports(&self) -> Result<Vec<String>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| Error::Io(io::Error::from(e)))?;
        let mut names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn open(&self, config: &SerialPortConfig) -> Result<Box<dyn SerialLine>> {
        let builder = tokio_serial::new(&config.port_name, config.baud_rate)
            .data_bits(Self::data_bits(config)?)
            .parity(Self::parity(config)?)
            .stop_bits(Self::stop_bits(config.stop_bits))
            .flow_control(tokio_serial::FlowControl::None);

        let stream = builder
            .open_native_async()
            .map_err(|e| Error::PortUnavailable(PortFault::classify(&config.port_name, &e)))?;

        debug!("Opened serial port {}", config);
        Ok(Box::new(stream))
    }
}

/// What the reader task reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent<'a> {
    /// Raw bytes from one read
    Data(&'a [u8]),

    /// The line failed and the reader stopped
    Lost(&'a str),
}

/// Callback invoked on the reader task
pub type ReceiveHandler = Arc<dyn Fn(LineEvent<'_>) + Send + Sync>;

/// Outcome of a connection probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub success: bool,
    pub message: String,
}

impl ProbeResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.success { "ok" } else { "failed" };
        write!(f, "{}: {}", verdict, self.message)
    }
}

/// One open serial line and its reader task
pub struct SerialChannel {
    port_name: String,
    shutdown: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
}

impl SerialChannel {
    /// Open the port and start reading
    ///
    /// Each read waits at most `poll` before checking for shutdown again.
    /// Must be called from within a tokio runtime.
    pub fn open(
        driver: &dyn SerialDriver,
        config: &SerialPortConfig,
        poll: Duration,
        handler: ReceiveHandler,
    ) -> Result<Self> {
        if !config.has_port() {
            return Err(rejected(config, "no port configured"));
        }
        config
            .validate()
            .map_err(|e| rejected(config, e.to_string()))?;

        let mut line = driver.open(config)?;
        if let Err(e) = line.discard_buffers() {
            warn!("Could not discard stale input on {}: {}", config.port_name, e);
        }

        let (tx, rx) = oneshot::channel();
        let reader = tokio::spawn(read_loop(
            config.port_name.clone(),
            line,
            rx,
            poll,
            handler,
        ));

        Ok(Self {
            port_name: config.port_name.clone(),
            shutdown: Some(tx),
            reader: Some(reader),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// The reader task is still running on a live line
    pub fn is_connected(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| !r.is_finished())
    }

    /// Stop the reader, flush and release the line
    ///
    /// Returns `false` if the channel was already closed.
    pub async fn close(&mut self) -> bool {
        let Some(reader) = self.reader.take() else {
            return false;
        };

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Err(e) = reader.await {
            warn!("Reader task for {} ended abnormally: {}", self.port_name, e);
        }

        debug!("Closed serial port {}", self.port_name);
        true
    }

    /// Check that a port exists and can be opened, then release it
    pub fn test_connection(driver: &dyn SerialDriver, config: &SerialPortConfig) -> ProbeResult {
        if !config.has_port() {
            return ProbeResult::failed("no port configured");
        }
        if let Err(e) = config.validate() {
            return ProbeResult::failed(e.to_string());
        }

        match driver.available_ports() {
            Ok(ports) => {
                if !ports.iter().any(|p| p.eq_ignore_ascii_case(&config.port_name)) {
                    return ProbeResult::failed(PortFault::not_found(&config.port_name).to_string());
                }
            }
            Err(e) => debug!("Port enumeration failed, trying to open directly: {}", e),
        }

        match driver.open(config) {
            Ok(mut line) => {
                let _ = line.discard_buffers();
                drop(line);
                ProbeResult::ok(format!("{} opened and closed successfully", config))
            }
            Err(Error::PortUnavailable(fault)) => ProbeResult::failed(fault.to_string()),
            Err(e) => ProbeResult::failed(format!("{}: {}", config.port_name, e)),
        }
    }
}

impl fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialChannel")
            .field("port_name", &self.port_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn read_loop(
    port: String,
    mut line: Box<dyn SerialLine>,
    mut shutdown: oneshot::Receiver<()>,
    poll: Duration,
    handler: ReceiveHandler,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(e) = line.discard_buffers() {
                    debug!("Flush on close failed for {}: {}", port, e);
                }
                return;
            }
            read = timeout(poll, line.read(&mut buf)) => match read {
                // No data within the poll window
                Err(_) => continue,
                Ok(Ok(0)) => {
                    warn!("Serial port {} reached end of stream", port);
                    handler(LineEvent::Lost("end of stream"));
                    return;
                }
                Ok(Ok(n)) => {
                    trace!("{} received {} bytes: {:02X?}", port, n, &buf[..n.min(32)]);
                    handler(LineEvent::Data(&buf[..n]));
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => continue,
                Ok(Err(e)) => {
                    warn!("Serial port {} failed: {}", port, e);
                    let reason = e.to_string();
                    handler(LineEvent::Lost(&reason));
                    return;
                }
            }
        }
    }
}

/// Whether a driver error means the port itself is unusable
pub fn is_port_fault(error: &Error, kind: PortFaultKind) -> bool {
    error.port_fault().is_some_and(|f| f.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    /// Hands out pre-made duplex lines by port name
    struct FakeDriver {
        ports: Vec<String>,
        lines: Mutex<Vec<(String, tokio::io::DuplexStream)>>,
    }

    impl FakeDriver {
        fn new() -> Self {
            Self {
                ports: Vec::new(),
                lines: Mutex::new(Vec::new()),
            }
        }

        fn attach(&mut self, port: &str) -> tokio::io::DuplexStream {
            let (device, host) = tokio::io::duplex(256);
            self.ports.push(port.to_string());
            self.lines.lock().push((port.to_string(), host));
            device
        }
    }

    impl SerialDriver for FakeDriver {
        fn available_ports(&self) -> Result<Vec<String>> {
            Ok(self.ports.clone())
        }

        fn open(&self, config: &SerialPortConfig) -> Result<Box<dyn SerialLine>> {
            let mut lines = self.lines.lock();
            match lines.iter().position(|(p, _)| *p == config.port_name) {
                Some(idx) => Ok(Box::new(lines.remove(idx).1)),
                None => Err(Error::PortUnavailable(PortFault::not_found(&config.port_name))),
            }
        }
    }

    #[derive(Debug, PartialEq)]
    enum Seen {
        Data(Vec<u8>),
        Lost(String),
    }

    fn recording_handler() -> (ReceiveHandler, mpsc::UnboundedReceiver<Seen>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: ReceiveHandler = Arc::new(move |event: LineEvent<'_>| {
            let seen = match event {
                LineEvent::Data(bytes) => Seen::Data(bytes.to_vec()),
                LineEvent::Lost(reason) => Seen::Lost(reason.to_string()),
            };
            let _ = tx.send(seen);
        });
        (handler, rx)
    }

    #[tokio::test]
    async fn test_channel_delivers_bytes() {
        let mut driver = FakeDriver::new();
        let mut device = driver.attach("COM3");
        let (handler, mut seen) = recording_handler();

        let config = SerialPortConfig::new("COM3");
        let mut channel =
            SerialChannel::open(&driver, &config, Duration::from_millis(10), handler).unwrap();
        assert!(channel.is_connected());

        device.write_all(b"ABC\r\n").await.unwrap();
        assert_eq!(seen.recv().await.unwrap(), Seen::Data(b"ABC\r\n".to_vec()));

        assert!(channel.close().await);
        assert!(!channel.is_connected());
        assert!(!channel.close().await);
    }

    #[tokio::test]
    async fn test_channel_reports_lost_line() {
        let mut driver = FakeDriver::new();
        let device = driver.attach("COM4");
        let (handler, mut seen) = recording_handler();

        let config = SerialPortConfig::new("COM4");
        let mut channel =
            SerialChannel::open(&driver, &config, Duration::from_millis(10), handler).unwrap();

        drop(device);
        assert_eq!(seen.recv().await.unwrap(), Seen::Lost("end of stream".into()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!channel.is_connected());
        // Handle is still held until closed
        assert!(channel.close().await);
    }

    #[tokio::test]
    async fn test_open_missing_port() {
        let driver = FakeDriver::new();
        let (handler, _seen) = recording_handler();

        let err = SerialChannel::open(
            &driver,
            &SerialPortConfig::new("COM9"),
            Duration::from_millis(10),
            handler,
        )
        .unwrap_err();
        assert!(is_port_fault(&err, PortFaultKind::NotFound));
    }

    #[tokio::test]
    async fn test_open_rejects_bad_parameters() {
        let mut driver = FakeDriver::new();
        let _device = driver.attach("COM3");
        let (handler, _seen) = recording_handler();

        let config = SerialPortConfig::new("COM3").with_data_bits(9);
        let err = SerialChannel::open(&driver, &config, Duration::from_millis(10), handler)
            .unwrap_err();
        assert!(is_port_fault(&err, PortFaultKind::ParameterRejected));
    }

    #[test]
    fn test_system_driver_rejects_mark_parity() {
        let config = SerialPortConfig::new("COM1").with_parity(Parity::Mark);
        let err = SystemSerialDriver::parity(&config).unwrap_err();
        assert!(is_port_fault(&err, PortFaultKind::ParameterRejected));

        let config = SerialPortConfig::new("COM1").with_parity(Parity::Even);
        assert_eq!(
            SystemSerialDriver::parity(&config).unwrap(),
            tokio_serial::Parity::Even
        );
    }

    #[tokio::test]
    async fn test_probe() {
        let mut driver = FakeDriver::new();
        let _device = driver.attach("COM3");

        let probe = SerialChannel::test_connection(&driver, &SerialPortConfig::new("COM3"));
        assert!(probe.success, "{}", probe);

        let probe = SerialChannel::test_connection(&driver, &SerialPortConfig::new("COM7"));
        assert!(!probe.success);
        assert!(probe.message.contains("not found"));

        let probe = SerialChannel::test_connection(&driver, &SerialPortConfig::new(""));
        assert_eq!(probe, ProbeResult::failed("no port configured"));
    }

    #[tokio::test]
    #[ignore] // Requires a real serial port
    async fn test_system_driver_open() {
        let driver = SystemSerialDriver;
        let ports = driver.available_ports().unwrap();
        let Some(port) = ports.first() else {
            return;
        };
        let probe = SerialChannel::test_connection(&driver, &SerialPortConfig::new(port.clone()));
        println!("{}: {}", port, probe);
    }
}
