//! Client for talking to a running daemon
//!
//! Keeps one connection open so the session's working directory carries over
//! between requests.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use super::protocol::*;
use crate::config::ProtocolConfig;
use crate::{Error, Result};

/// Connection to the daemon speaking the enveloped protocol
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    max_frame_bytes: usize,
    max_line_bytes: usize,
}

impl DaemonClient {
    /// Connect to a daemon
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            Error::Other(format!("Failed to connect to daemon: {}. Is the daemon running?", e))
        })?;
        let (reader, writer) = stream.into_split();
        let defaults = ProtocolConfig::default();

        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            max_frame_bytes: defaults.max_frame_bytes,
            max_line_bytes: defaults.max_line_bytes,
        })
    }

    /// Match the daemon's `protocol` settings
    pub fn with_protocol(mut self, config: &ProtocolConfig) -> Self {
        self.max_frame_bytes = config.max_frame_bytes;
        self.max_line_bytes = config.max_line_bytes;
        self
    }

    /// Send one request line without waiting for an answer
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.contains('\n') {
            return Err(Error::syntax("request must be a single line"));
        }
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send one request line and read its frame, if the command produces one.
    ///
    /// With the envelope on, the daemon answers an expected frame it cannot
    /// deliver with an empty `ERR` frame, which decodes to [`Frame::Error`].
    pub async fn request(&mut self, line: &str) -> Result<Option<Frame>> {
        self.send_line(line).await?;
        if !self.expects_frame(line) {
            return Ok(None);
        }
        self.read_frame().await.map(Some)
    }

    /// Whether the daemon will answer `line`; over-long lines always get `ERR 0`
    pub fn expects_frame(&self, line: &str) -> bool {
        let line = line.trim_end_matches(['\r', '\n']);
        line.len() + 1 > self.max_line_bytes || commands::expects_frame(line)
    }

    /// Read the next enveloped frame
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let mut header = String::new();
        if self.reader.read_line(&mut header).await? == 0 {
            return Err(Error::Other("Connection closed by daemon".to_string()));
        }

        let (status, len) = FrameStatus::parse_header(&header)?;
        if len > self.max_frame_bytes {
            return Err(Error::FrameTooLarge {
                size: len,
                max: self.max_frame_bytes,
            });
        }
        debug!("frame header: {} {}", status.as_str(), len);

        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await?;
        Frame::decode(status, &body)
    }

    /// End the session politely
    pub async fn quit(mut self) -> Result<()> {
        self.send_line(commands::QUIT).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Check if a daemon answers on `addr`
pub async fn is_daemon_running(addr: impl ToSocketAddrs) -> bool {
    match DaemonClient::connect(addr).await {
        Ok(client) => client.quit().await.is_ok(),
        Err(_) => false,
    }
}
