//! TCP server for the daemon
//!
//! Serves one connection at a time: the accept loop hands each client to
//! [`DaemonServer::handle_connection`] and only accepts again once that
//! client disconnects or sends `quit`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::encoder::ResponseEncoder;
use super::protocol::{commands, Frame};
use crate::config::AppConfig;
use crate::dispatch::{Dispatcher, Flow};
use crate::error::CODE_SYNTAX;
use crate::jail::{PathResolver, Session, VirtualRoot};
use crate::ops::ProcessTable;
use crate::{Error, Result};

/// File-management daemon listening on TCP
pub struct DaemonServer {
    config: Arc<AppConfig>,
    root: VirtualRoot,
    resolver: PathResolver,
    dispatcher: Dispatcher,
    encoder: ResponseEncoder,
}

/// One request line as read off the socket
#[derive(Debug, PartialEq)]
enum Request {
    Line(String),
    /// Over `max_line_bytes`; already drained up to its newline
    TooLong,
    Closed,
}

impl DaemonServer {
    /// Build a server, creating the jail directory if needed
    pub fn new(config: Arc<AppConfig>) -> Result<Self> {
        let dispatcher = Dispatcher::from_config(&config.protocol);
        Self::with_dispatcher(config, dispatcher)
    }

    /// Build a server that lists processes from `processes` instead of `/proc`
    pub fn with_process_table(
        config: Arc<AppConfig>,
        processes: Box<dyn ProcessTable>,
    ) -> Result<Self> {
        let dispatcher = Dispatcher::new(config.protocol.max_args, processes);
        Self::with_dispatcher(config, dispatcher)
    }

    fn with_dispatcher(config: Arc<AppConfig>, dispatcher: Dispatcher) -> Result<Self> {
        let root = VirtualRoot::create(config.jail_root())?;
        Ok(Self {
            resolver: PathResolver::from_limits(&config.limits),
            encoder: ResponseEncoder::from_config(&config.protocol),
            root,
            dispatcher,
            config,
        })
    }

    pub fn root(&self) -> &VirtualRoot {
        &self.root
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on: {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and serve until shutdown is signaled
    pub async fn run(&self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Accept loop over an already bound listener
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("Jail root: {}", self.root.path().display());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            info!("Connection accepted from {}", peer);
                            if let Err(e) = self.handle_connection(stream, peer, shutdown_rx.clone()).await {
                                warn!("Error handling connection: {}", e);
                            }
                            info!("Connection from {} closed", peer);
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = async { shutdown_rx.wait_for(|stop| *stop).await.map(|_| ()) } => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut session = Session::new(self.root.clone(), self.resolver);
        let span = info_span!("session", id = %session.id(), peer = %peer);
        self.session_loop(stream, &mut session, shutdown_rx)
            .instrument(span)
            .await
    }

    async fn session_loop(
        &self,
        stream: TcpStream,
        session: &mut Session,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let max_line = self.config.protocol.max_line_bytes;

        debug!("session started at {}", session.connected_at());

        loop {
            // Only a real shutdown cancels the read; a partial line is lost then.
            let request = tokio::select! {
                request = read_request(&mut reader, &mut buf, max_line) => request?,
                _ = async { shutdown_rx.wait_for(|stop| *stop).await.map(|_| ()) } => {
                    info!("Closing session for shutdown");
                    break;
                }
            };

            let line = match request {
                Request::Line(line) => line,
                Request::TooLong => {
                    warn!(
                        "request line over {} bytes discarded: return fail({})",
                        max_line, CODE_SYNTAX
                    );
                    if let Some(bytes) = self.encoder.missing_frame() {
                        writer.write_all(&bytes).await?;
                        writer.flush().await?;
                    }
                    continue;
                }
                Request::Closed => break,
            };
            debug!("Received request: {:?}", line);

            let frame = match self.dispatcher.dispatch(&line, session) {
                Flow::Continue(frame) => frame,
                Flow::Quit => {
                    info!("Client quit");
                    break;
                }
            };

            let bytes = match frame.and_then(|frame| self.encode(&frame)) {
                Some(bytes) => Some(bytes),
                // The client is waiting on this line; tell it nothing is coming.
                None if commands::expects_frame(&line) => self.encoder.missing_frame(),
                None => None,
            };
            if let Some(bytes) = bytes {
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    // A frame that cannot be encoded is dropped; the session goes on.
    fn encode(&self, frame: &Frame) -> Option<Vec<u8>> {
        match self.encoder.encode(frame) {
            Ok(bytes) => Some(bytes),
            Err(Error::FrameTooLarge { size, max }) => {
                warn!("Response of {} bytes exceeds {} and was dropped", size, max);
                None
            }
            Err(e) => {
                error!("Failed to encode response: {}", e);
                None
            }
        }
    }
}

/// Read one newline-terminated request of at most `max` bytes
async fn read_request<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> Result<Request>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader).take(max as u64).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Request::Closed);
    }

    if buf.last() != Some(&b'\n') && n >= max {
        drain_line(reader).await?;
        return Ok(Request::TooLong);
    }

    let line = String::from_utf8_lossy(buf);
    Ok(Request::Line(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain_line<R>(reader: &mut R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
}
