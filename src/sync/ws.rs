//! WebSocket channel over `tungstenite`.
//!
//! Connecting is bounded by a handshake budget: the TCP connect, the upgrade
//! request and the upgrade response must all finish inside it. The socket is
//! switched to non-blocking mode right after the handshake so `try_recv`
//! never stalls the host's poll loop. Only plain `ws://` endpoints are
//! supported.

use std::time::Duration;

use crate::error::{LayoutError, Result};
use crate::sync::transport::{Channel, Connector};

#[cfg(feature = "remote")]
use std::io;
#[cfg(feature = "remote")]
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(feature = "remote")]
use std::time::Instant;
#[cfg(feature = "remote")]
use tungstenite::client::IntoClientRequest;
#[cfg(feature = "remote")]
use tungstenite::{Error as WsError, HandshakeError, Message, WebSocket};

/// Default budget for connect plus upgrade handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Opens WebSocket channels.
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Time left until `deadline`, never zero (socket timeouts reject zero).
#[cfg(feature = "remote")]
fn remaining(deadline: Instant) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .max(Duration::from_millis(1))
}

#[cfg(feature = "remote")]
fn open_stream(host: &str, port: u16, deadline: Instant) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, remaining(deadline)) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
        if Instant::now() >= deadline {
            break;
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    }))
}

#[cfg(feature = "remote")]
impl Connector for WsConnector {
    fn connect(&mut self, url: &str) -> Result<Box<dyn Channel>> {
        let failed = |reason: String| LayoutError::ConnectFailed {
            url: url.to_string(),
            reason,
        };
        let deadline = Instant::now() + self.timeout;

        let request = url
            .into_client_request()
            .map_err(|e| failed(e.to_string()))?;
        let (host, port) = {
            let uri = request.uri();
            if uri.scheme_str() != Some("ws") {
                return Err(failed("only ws:// endpoints are supported".to_string()));
            }
            let host = uri
                .host()
                .ok_or_else(|| failed("missing host".to_string()))?
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string();
            (host, uri.port_u16().unwrap_or(80))
        };

        let stream = open_stream(&host, port, deadline).map_err(|e| failed(e.to_string()))?;
        stream
            .set_read_timeout(Some(remaining(deadline)))
            .and_then(|()| stream.set_write_timeout(Some(remaining(deadline))))
            .map_err(|e| failed(e.to_string()))?;

        let mut attempt = tungstenite::client(request, stream);
        let (mut socket, response) = loop {
            match attempt {
                Ok(done) => break done,
                // A socket timeout surfaces as an interrupted handshake.
                Err(HandshakeError::Interrupted(mid)) => {
                    if Instant::now() >= deadline {
                        return Err(failed(format!(
                            "handshake timed out after {}ms",
                            self.timeout.as_millis()
                        )));
                    }
                    attempt = mid.handshake();
                }
                Err(HandshakeError::Failure(e)) => return Err(failed(e.to_string())),
            }
        };

        log::debug!("WebSocket handshake with {} returned {}", url, response.status());

        let stream = socket.get_mut();
        stream
            .set_read_timeout(None)
            .and_then(|()| stream.set_write_timeout(None))
            .and_then(|()| stream.set_nonblocking(true))
            .map_err(|e| failed(e.to_string()))?;

        Ok(Box::new(WsChannel {
            socket,
            closed: false,
        }))
    }
}

#[cfg(not(feature = "remote"))]
impl Connector for WsConnector {
    fn connect(&mut self, _url: &str) -> Result<Box<dyn Channel>> {
        Err(LayoutError::RemoteUnavailable)
    }
}

/// Client end of a WebSocket connection.
#[cfg(feature = "remote")]
pub struct WsChannel {
    socket: WebSocket<TcpStream>,
    closed: bool,
}

#[cfg(feature = "remote")]
fn is_would_block(error: &WsError) -> bool {
    matches!(error, WsError::Io(e) if e.kind() == io::ErrorKind::WouldBlock)
}

#[cfg(feature = "remote")]
fn transport_error(error: WsError) -> LayoutError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => LayoutError::ChannelClosed,
        other => LayoutError::Transport {
            reason: other.to_string(),
        },
    }
}

#[cfg(feature = "remote")]
impl Channel for WsChannel {
    fn send(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(LayoutError::ChannelClosed);
        }

        match self.socket.send(Message::text(text.to_string())) {
            Ok(()) => Ok(()),
            // Frame is buffered; it goes out on the next flush.
            Err(e) if is_would_block(&e) => Ok(()),
            Err(e) => Err(transport_error(e)),
        }
    }

    fn try_recv(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Err(LayoutError::ChannelClosed);
        }

        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_string())),
                Ok(Message::Close(_)) => {
                    self.closed = true;
                    return Err(LayoutError::ChannelClosed);
                }
                // Control frames are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) if is_would_block(&e) => {
                    match self.socket.flush() {
                        Ok(()) => {}
                        Err(e) if is_would_block(&e) => {}
                        Err(e) => return Err(transport_error(e)),
                    }
                    return Ok(None);
                }
                Err(e) => {
                    self.closed = true;
                    return Err(transport_error(e));
                }
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.socket.close(None) {
            if !is_would_block(&e) {
                log::debug!("WebSocket close: {}", e);
            }
        }
        let _ = self.socket.flush();
    }
}
