//! WebSocket transport over a plain TCP stream.
//!
//! RULES:
//!   - open() is bounded: the TCP connect and the HTTP upgrade together
//!     finish within the handshake timeout or fail as a transport error.
//!   - Reads use a short socket timeout so poll_message() returns Idle
//!     instead of blocking the caller's loop.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::{Error as WsError, Message, WebSocket};

use crate::{
    connection::{Connector, Transport, TransportPoll},
    error::{WatchError, WatchResult},
};

pub struct WsConnector {
    read_timeout:      Duration,
    handshake_timeout: Duration,
}

impl WsConnector {
    pub fn new(read_timeout: Duration, handshake_timeout: Duration) -> Self {
        Self {
            read_timeout,
            handshake_timeout,
        }
    }

    /// First address of `host:port` that accepts within the remaining budget.
    fn connect_tcp(&self, host: &str, port: u16, deadline: Instant) -> WatchResult<TcpStream> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let mut last_err = None;
        for addr in addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    log::debug!("tcp connect {addr} failed: {err}");
                    last_err = Some(err);
                }
            }
        }
        Err(match last_err {
            Some(err) => WatchError::Transport(format!("connect {host}:{port}: {err}")),
            None => WatchError::Transport(format!("connect {host}:{port}: no address reachable")),
        })
    }
}

impl Connector for WsConnector {
    fn open(&mut self, url: &str) -> WatchResult<Box<dyn Transport>> {
        let deadline = Instant::now() + self.handshake_timeout;
        let request = url.into_client_request()?;
        let uri = request.uri();
        if uri.scheme_str() != Some("ws") {
            return Err(WatchError::Transport(format!("unsupported scheme in {url}")));
        }
        let host = uri
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| WatchError::Transport(format!("no host in {url}")))?;
        let port = uri.port_u16().unwrap_or(80);

        let stream = self.connect_tcp(&host, port, deadline)?;
        // Timeouts go on before the upgrade so a silent peer cannot stall it.
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_write_timeout(Some(self.handshake_timeout))?;

        let mut attempt = tungstenite::client(request, stream);
        let (socket, response) = loop {
            match attempt {
                Ok(done) => break done,
                Err(HandshakeError::Failure(err)) => return Err(err.into()),
                Err(HandshakeError::Interrupted(mid)) => {
                    if Instant::now() >= deadline {
                        return Err(WatchError::Transport(format!(
                            "handshake with {url} timed out after {}ms",
                            self.handshake_timeout.as_millis()
                        )));
                    }
                    attempt = mid.handshake();
                }
            }
        };
        log::debug!("websocket open: {url} status={}", response.status());
        Ok(Box::new(WsTransport { socket }))
    }
}

struct WsTransport {
    socket: WebSocket<TcpStream>,
}

impl Transport for WsTransport {
    fn send_text(&mut self, payload: &str) -> WatchResult<()> {
        self.socket.send(Message::text(payload.to_string()))?;
        Ok(())
    }

    fn poll_message(&mut self) -> WatchResult<TransportPoll> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(TransportPoll::Message(text.as_str().to_string())),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Ok(TransportPoll::Message(text)),
                Err(_) => {
                    log::warn!("non UTF-8 binary frame ({} bytes) ignored", bytes.len());
                    Ok(TransportPoll::Idle)
                }
            },
            Ok(Message::Close(frame)) => {
                log::info!("peer closed: {frame:?}");
                Ok(TransportPoll::Closed)
            }
            // Pings are answered by tungstenite on the next read or write.
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Ok(TransportPoll::Idle),
            Err(WsError::Io(err))
                if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Ok(TransportPoll::Idle)
            }
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(TransportPoll::Closed),
            Err(err) => Err(err.into()),
        }
    }

    fn close(&mut self) {
        if let Err(err) = self.socket.close(None) {
            log::debug!("close handshake skipped: {err}");
        }
        let _ = self.socket.flush();
    }
}
