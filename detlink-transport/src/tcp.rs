//! ISO-on-TCP transport (RFC 1006)

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use detlink_core::constants::{tpkt, DEFAULT_TIMEOUT_MS, ISO_TCP_PORT};
use detlink_core::packet::tpkt_length;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

/// TCP transport that exchanges whole TPKT frames
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
    
    /// Transport to the standard ISO-on-TCP port
    pub fn iso_on_tcp(addr: impl Into<String>) -> Self {
        Self::new(addr, ISO_TCP_PORT)
    }
    
    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
    
    /// Set write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
    
    /// Resolve address to SocketAddr, giving up at `deadline`
    async fn resolve_addr(&mut self, deadline: Instant) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }
        
        let addr_str = format!("{}:{}", self.addr, self.port);
        let addr = resolve_within(&addr_str, deadline, tokio::net::lookup_host(addr_str.clone())).await?;
        
        self.socket_addr = Some(addr);
        Ok(addr)
    }
}

/// First address produced by `lookup`; a lookup still pending at `deadline`
/// counts as a connect timeout
async fn resolve_within<F, I>(addr_str: &str, deadline: Instant, lookup: F) -> Result<SocketAddr>
where
    F: Future<Output = std::io::Result<I>>,
    I: Iterator<Item = SocketAddr>,
{
    let mut addrs = timeout_at(deadline, lookup)
        .await
        .map_err(|_| Error::ConnectionTimeout)?
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?;
    
    addrs
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))
}

/// Read one TPKT frame: the 4-byte header, then the body it announces
async fn read_frame(stream: &mut TcpStream) -> Result<BytesMut> {
    let mut header = [0u8; tpkt::HEADER_SIZE];
    stream.read_exact(&mut header).await.map_err(closed_or_io)?;
    
    let length = tpkt_length(&header)?;
    
    let mut frame = BytesMut::with_capacity(length);
    frame.extend_from_slice(&header);
    frame.resize(length, 0);
    stream
        .read_exact(&mut frame[tpkt::HEADER_SIZE..])
        .await
        .map_err(closed_or_io)?;
    
    Ok(frame)
}

fn closed_or_io(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        
        // One bound for name resolution and the TCP handshake
        let deadline = Instant::now() + self.connect_timeout;
        let addr = self.resolve_addr(deadline).await?;
        
        debug!("Connecting to {}...", addr);
        
        let stream = timeout_at(deadline, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;
        
        // Jobs are small request/reply pairs
        stream.set_nodelay(true)?;
        
        debug!("Connected to {}", addr);
        
        self.stream = Some(stream);
        Ok(())
    }
    
    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());
            
            let _ = stream.shutdown().await;
        }
        
        self.socket_addr = None;
        Ok(())
    }
    
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
    
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        
        trace!("Sending {} bytes: {:02X?}", data.len(), &data[..data.len().min(32)]);
        
        timeout(self.write_timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| Error::WriteTimeout)??;
        
        Ok(())
    }
    
    async fn receive(&mut self, timeout_duration: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        
        let frame = timeout(timeout_duration, read_frame(stream))
            .await
            .map_err(|_| Error::ReadTimeout)??;
        
        trace!("Received {} bytes: {:02X?}", frame.len(), &frame[..frame.len().min(32)]);
        
        Ok(frame)
    }
    
    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    
    #[tokio::test]
    async fn test_tcp_transport_create() {
        let transport = TcpTransport::iso_on_tcp("192.168.0.10");
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "192.168.0.10:102");
    }
    
    #[tokio::test]
    async fn test_tcp_transport_invalid_address() {
        let mut transport = TcpTransport::new("invalid..address", 102)
            .with_connect_timeout(Duration::from_millis(100));
        
        let result = transport.connect().await;
        assert!(result.is_err());
    }
    
    #[tokio::test(start_paused = true)]
    async fn test_stalled_lookup_hits_connect_deadline() {
        let deadline = Instant::now() + Duration::from_millis(5000);
        let stalled = std::future::pending::<std::io::Result<std::vec::IntoIter<SocketAddr>>>();

        let result = resolve_within("plc.line:102", deadline, stalled).await;
        assert!(matches!(result, Err(Error::ConnectionTimeout)));
        assert!(Instant::now() >= deadline);
    }

    #[tokio::test]
    async fn test_lookup_takes_first_address() {
        let deadline = Instant::now() + Duration::from_millis(100);
        let first: SocketAddr = "10.0.0.5:102".parse().unwrap();
        let second: SocketAddr = "10.0.0.6:102".parse().unwrap();

        let found = resolve_within("plc:102", deadline, async move {
            Ok::<_, std::io::Error>(vec![first, second].into_iter())
        })
            .await
            .unwrap();
        assert_eq!(found, first);

        let empty = resolve_within("plc:102", deadline, async {
            Ok::<_, std::io::Error>(Vec::<SocketAddr>::new().into_iter())
        }).await;
        assert!(matches!(empty, Err(Error::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut transport = TcpTransport::iso_on_tcp("127.0.0.1");
        assert!(matches!(transport.send(&[0x03]).await, Err(Error::NotConnected)));
        assert!(matches!(
            transport.receive(Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
    }
    
    #[tokio::test]
    async fn test_receive_reassembles_split_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // One 7-byte frame delivered in two pieces, then a second frame
            socket.write_all(&[0x03, 0x00, 0x00]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(&[0x07, 0x02, 0xF0, 0x80]).await.unwrap();
            socket.write_all(&[0x03, 0x00, 0x00, 0x07, 0x02, 0xF0, 0x80]).await.unwrap();
            socket.flush().await.unwrap();
        });
        
        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect().await.unwrap();
        
        let first = transport.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(&first[..], &[0x03, 0x00, 0x00, 0x07, 0x02, 0xF0, 0x80]);
        let second = transport.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(second.len(), 7);
        
        server.await.unwrap();
        assert!(matches!(
            transport.receive(Duration::from_secs(1)).await,
            Err(Error::ConnectionClosed)
        ));
        transport.disconnect().await.unwrap();
    }
    
    #[tokio::test]
    async fn test_receive_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(socket);
        });
        
        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect().await.unwrap();
        let result = transport.receive(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::ReadTimeout)));
        
        transport.disconnect().await.unwrap();
        server.await.unwrap();
    }
    
    #[tokio::test]
    async fn test_bad_tpkt_version_is_framing_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[0x04, 0x00, 0x00, 0x07]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        });
        
        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect().await.unwrap();
        let result = transport.receive(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Framing(_))));
        
        transport.disconnect().await.unwrap();
        server.await.unwrap();
    }
}
