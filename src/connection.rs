use std::fmt;
use std::io::{Error as IoError, ErrorKind};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tungstenite::client::client;
use tungstenite::handshake::{HandshakeError, HandshakeRole};
use tungstenite::{Error as WsError, WebSocket};
use url::Url;

use crate::error::RconError;
use crate::retry::Interrupt;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where and how to reach a server's RCON listener.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    credential: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, credential: impl Into<String>) -> Self {
        Endpoint {
            host: host.into(),
            port,
            credential: credential.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Handshake target with the credential as its only path segment.
    pub fn url(&self) -> Result<Url, RconError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(RconError::InvalidEndpoint("host must not be empty".into()));
        }
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };

        let mut url = Url::parse(&format!("ws://{}:{}/", host, self.port))
            .map_err(|e| RconError::InvalidEndpoint(format!("{}: {}", self.host, e)))?;
        url.path_segments_mut()
            .map_err(|_| RconError::InvalidEndpoint(format!("{} cannot carry a path", self.host)))?
            .clear()
            .push(&self.credential);
        Ok(url)
    }

    fn socket_addrs(&self) -> Result<Vec<SocketAddr>, RconError> {
        let addrs: Vec<SocketAddr> = (self.host.trim(), self.port)
            .to_socket_addrs()
            .map_err(|e| RconError::ConnectionError(format!("{}: {}", self.host, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(RconError::ConnectionError(format!(
                "{} did not resolve to any address",
                self.host
            )));
        }
        Ok(addrs)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("credential", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Bounds the TCP connect and the WebSocket upgrade.
    pub connect_timeout: Duration,
    /// `None` waits for a reply for as long as the server keeps the socket open.
    pub reply_timeout: Option<Duration>,
    /// Read granularity while waiting for a reply; bounds interrupt latency.
    pub poll_interval: Duration,
}

impl ConnectOptions {
    /// Socket timeouts reject zero durations, so catch them before any I/O.
    pub fn validate(&self) -> Result<(), RconError> {
        if self.connect_timeout.is_zero() {
            return Err(RconError::InvalidOptions("connect timeout must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(RconError::InvalidOptions("poll interval must be non-zero".into()));
        }
        if self.reply_timeout.is_some_and(|t| t.is_zero()) {
            return Err(RconError::InvalidOptions("reply timeout must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reply_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One open WebSocket plus its outgoing request counter.
///
/// The connection is released on [`Session::close`] or on drop, whichever
/// comes first.
pub struct Session {
    socket: Option<WebSocket<TcpStream>>,
    request_id: i64,
    options: ConnectOptions,
    interrupt: Interrupt,
}

impl Session {
    pub fn open(
        endpoint: &Endpoint,
        options: &ConnectOptions,
        interrupt: Interrupt,
    ) -> Result<Session, RconError> {
        options.validate()?;
        let url = endpoint.url()?;
        let stream = connect_tcp(endpoint, options.connect_timeout)?;

        stream.set_read_timeout(Some(options.connect_timeout))?;
        stream.set_write_timeout(Some(options.connect_timeout))?;

        let (socket, _) = client(url.as_str(), stream).map_err(map_handshake_error)?;
        socket.get_ref().set_read_timeout(Some(options.poll_interval))?;
        tracing::debug!(host = %endpoint.host, port = endpoint.port, "Connected");

        let session = Session {
            socket: Some(socket),
            request_id: 0,
            options: *options,
            interrupt,
        };
        // Dropping the session on this path sends the Close frame.
        if session.interrupt.is_raised() {
            return Err(RconError::Interrupted);
        }
        Ok(session)
    }

    /// A session that was never opened; closing it does nothing.
    pub fn closed() -> Session {
        Session {
            socket: None,
            request_id: 0,
            options: ConnectOptions::default(),
            interrupt: Interrupt::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Identifier of the most recent request, 0 before the first one.
    pub fn last_request_id(&self) -> i64 {
        self.request_id
    }

    pub fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
            tracing::debug!("Disconnected from server");
        }
    }

    pub(crate) fn next_request_id(&mut self) -> i64 {
        self.request_id += 1;
        self.request_id
    }

    pub(crate) fn socket_mut(&mut self) -> Result<&mut WebSocket<TcpStream>, RconError> {
        self.socket.as_mut().ok_or(RconError::NotConnected)
    }

    pub(crate) fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub(crate) fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("request_id", &self.request_id)
            .finish()
    }
}

impl From<IoError> for RconError {
    fn from(e: IoError) -> Self {
        if is_timeout(&e) {
            RconError::ConnectionTimeout
        } else {
            RconError::ConnectionError(e.to_string())
        }
    }
}

fn connect_tcp(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream, RconError> {
    let mut last = None;
    for addr in endpoint.socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, "connect failed: {}", e);
                last = Some(e);
            }
        }
    }
    Err(last.map(RconError::from).unwrap_or_else(|| {
        RconError::ConnectionError(format!("{} did not resolve to any address", endpoint.host))
    }))
}

fn map_handshake_error<R: HandshakeRole>(e: HandshakeError<R>) -> RconError {
    match e {
        // A blocking socket only reports WouldBlock once its read timeout expired.
        HandshakeError::Interrupted(_) => RconError::ConnectionTimeout,
        HandshakeError::Failure(WsError::Http(response)) => {
            RconError::from_handshake_status(response.status().as_u16())
        }
        HandshakeError::Failure(WsError::Io(e)) => RconError::from(e),
        HandshakeError::Failure(e) => RconError::ConnectionError(e.to_string()),
    }
}

pub(crate) fn is_timeout(e: &IoError) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
