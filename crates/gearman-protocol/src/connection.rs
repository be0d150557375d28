use crate::{Command, Frame, GearmanCodec, ProtocolError, Result};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::codec::Framed;

use std::io;
use std::time::Duration;
use tracing::{debug, warn};

/// Port used when a server address carries none
pub const DEFAULT_PORT: u16 = 4730;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Split `host` or `host:port` into its parts
///
/// Bracketed IPv6 literals (`[::1]:4730`) are accepted. A missing or
/// unparsable port falls back to `default_port`.
pub fn split_address(address: &str, default_port: u16) -> (String, u16) {
    if let Some((host, port)) = address.rsplit_once(':') {
        let bracketed = host.starts_with('[') && host.ends_with(']');
        if bracketed || !host.contains(':') {
            if let Ok(port) = port.parse() {
                let host = host.trim_start_matches('[').trim_end_matches(']');
                return (host.to_string(), port);
            }
        }
    }

    let host = address.trim_start_matches('[').trim_end_matches(']');
    (host.to_string(), default_port)
}

/// A session with one job server
#[derive(Debug)]
pub struct Connection {
    address: String,
    framed: Option<Framed<TcpStream, GearmanCodec>>,
}

impl Connection {
    /// Connect to `address` and announce `client_id` to the server
    pub async fn open(
        address: &str,
        client_id: &str,
        default_port: u16,
        timeout: Duration,
    ) -> Result<Self> {
        let mut conn = Connection::connect(address, default_port, timeout).await?;
        conn.send(Frame::request(Command::SetClientId).with("client_id", client_id))
            .await?;
        Ok(conn)
    }

    /// Establish the TCP session without sending anything
    ///
    /// Transient failures are retried until `timeout` has elapsed; a refused
    /// or unreachable server fails immediately.
    pub async fn connect(address: &str, default_port: u16, timeout: Duration) -> Result<Self> {
        let (host, port) = split_address(address, default_port);
        let connect_failed = |source: io::Error| ProtocolError::ConnectFailed {
            address: address.to_string(),
            source,
        };

        let deadline = Instant::now() + timeout;
        let stream = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());

            match tokio::time::timeout(remaining, TcpStream::connect((host.as_str(), port))).await {
                Ok(Ok(stream)) => break stream,
                Ok(Err(e))
                    if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
                        && Instant::now() + CONNECT_RETRY_DELAY < deadline =>
                {
                    debug!(server = %address, "Transient connect error, retrying: {}", e);
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                Ok(Err(e)) => return Err(connect_failed(e)),
                Err(_) => {
                    return Err(connect_failed(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect timed out after {:?}", timeout),
                    )))
                }
            }
        };

        stream.set_nodelay(true).map_err(connect_failed)?;
        debug!(server = %address, "Connected");

        Ok(Connection {
            address: address.to_string(),
            framed: Some(Framed::new(stream, GearmanCodec)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Write one complete packet
    pub async fn send(&mut self, frame: Frame) -> Result<()> {
        let framed = self.framed.as_mut().ok_or_else(|| {
            ProtocolError::WriteFailed(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            ))
        })?;

        debug!(server = %self.address, command = %frame.command, "Sending packet");

        framed.send(frame).await.map_err(|e| match e {
            ProtocolError::IoError(e) => ProtocolError::WriteFailed(e),
            other => other,
        })
    }

    /// Read the next packet
    ///
    /// Returns `Ok(None)` when the server closed the connection cleanly
    /// before sending any part of another packet.
    pub async fn read(&mut self) -> Result<Option<Frame>> {
        let framed = self.framed.as_mut().ok_or(ProtocolError::ConnectionReset)?;

        match framed.next().await {
            Some(Ok(frame)) => {
                debug!(server = %self.address, command = %frame.command, "Received packet");
                Ok(Some(frame))
            }
            Some(Err(ProtocolError::IoError(e))) => {
                warn!(server = %self.address, "Read failed: {}", e);
                Err(ProtocolError::ConnectionReset)
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Read the next packet, waiting at most `timeout`
    ///
    /// Bytes of a packet that is still incomplete when the timeout fires stay
    /// buffered for the next read.
    pub async fn blocking_read(&mut self, timeout: Duration) -> Result<Frame> {
        match tokio::time::timeout(timeout, self.read()).await {
            Ok(Ok(Some(frame))) => Ok(frame),
            Ok(Ok(None)) => Err(ProtocolError::ConnectionReset),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProtocolError::ReadTimeout(timeout)),
        }
    }

    /// Wait until the server has sent something
    ///
    /// Already-buffered bytes count as readable.
    pub async fn readable(&self) -> Result<()> {
        let framed = self.framed.as_ref().ok_or(ProtocolError::ConnectionReset)?;

        if !framed.read_buffer().is_empty() {
            return Ok(());
        }

        framed.get_ref().readable().await?;
        Ok(())
    }

    /// Drop the socket. Safe to call more than once.
    pub fn close(&mut self) {
        if self.framed.take().is_some() {
            debug!(server = %self.address, "Connection closed");
        }
    }
}
