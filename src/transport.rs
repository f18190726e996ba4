//! Network transport layer for AMS over TCP
//!
//! One transport owns one socket, the local/remote AMS endpoint pair and a
//! connection-scoped invoke-id counter. AMS is half-duplex per connection:
//! exactly one transaction is in flight at any time, so `transact` takes
//! `&mut self` and no further locking is required.
//!
//! Every socket operation is bounded by the configured response timeout. A
//! transport-level failure (I/O, timeout, malformed envelope, invoke-id
//! mismatch) poisons the connection; the stream is dropped and the caller
//! has to reconnect.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::constants::{
    AMS_HEADER_LEN, AMS_TCP_HEADER_LEN, DEFAULT_MAX_SUMUP_ITEMS, DEFAULT_RETRY_INTERVAL_MS,
    DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS,
};
use crate::error::{AdsError, AdsResult, AdsReturnCode};
use crate::frame::{AmsHeader, AmsTcpHeader};
use crate::protocol::{AdsRequest, AdsResponse};
use crate::types::{AmsAddr, AmsNetId, AmsPort};

// ============================================================================
// Configuration
// ============================================================================

/// Connection parameters for one ADS target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdsConnectionConfig {
    /// Remote host name or IP
    pub host: String,
    /// Remote AMS/TCP port
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    /// AMS net id of the remote endpoint
    pub target_net_id: AmsNetId,
    /// AMS port of the remote runtime
    #[serde(default = "default_target_port")]
    pub target_port: AmsPort,
    /// AMS net id this client presents
    pub source_net_id: AmsNetId,
    /// AMS port this client presents
    #[serde(default = "default_source_port")]
    pub source_port: AmsPort,
    /// Response timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Delay between reconnect attempts in milliseconds
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Maximum sub-items per sum-up wire transaction
    #[serde(default = "default_max_sumup_items")]
    pub max_sumup_items: usize,
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_target_port() -> AmsPort {
    AmsPort::PLC_RUNTIME_1
}

fn default_source_port() -> AmsPort {
    AmsPort(32905)
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

fn default_max_sumup_items() -> usize {
    DEFAULT_MAX_SUMUP_ITEMS
}

impl AdsConnectionConfig {
    /// Minimal config for a target; everything else defaulted
    pub fn new(host: impl Into<String>, target_net_id: AmsNetId, source_net_id: AmsNetId) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_TCP_PORT,
            target_net_id,
            target_port: AmsPort::PLC_RUNTIME_1,
            source_net_id,
            source_port: default_source_port(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            max_sumup_items: DEFAULT_MAX_SUMUP_ITEMS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Remote AMS endpoint address
    pub fn target_addr(&self) -> AmsAddr {
        AmsAddr::new(self.target_net_id, self.target_port)
    }

    /// Local AMS endpoint address
    pub fn source_addr(&self) -> AmsAddr {
        AmsAddr::new(self.source_net_id, self.source_port)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Transport-level counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Byte-level request/response channel to one AMS endpoint.
///
/// Implemented by [`TcpTransport`] for production use; tests substitute
/// scripted implementations.
#[async_trait]
pub trait AmsTransport: Send {
    /// Execute one request/response transaction
    async fn transact(&mut self, request: &AdsRequest) -> AdsResult<AdsResponse>;

    /// Close the channel (best effort)
    async fn close(&mut self) -> AdsResult<()>;

    /// Whether the channel is currently usable
    fn is_connected(&self) -> bool;

    /// Transport counters
    fn stats(&self) -> TransportStats;
}

// ============================================================================
// TCP Transport
// ============================================================================

/// AMS transport over one TCP connection
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    local: AmsAddr,
    remote: AmsAddr,
    timeout: Duration,
    /// Connection-scoped correlation counter; independent connections never
    /// share invoke-id space
    invoke_id: u32,
    stats: TransportStats,
}

impl TcpTransport {
    /// Open a TCP connection to the configured target
    pub async fn connect(config: &AdsConnectionConfig) -> AdsResult<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        debug!("TCP connecting: {}", addr);

        match timeout(config.timeout(), TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }
                info!("TCP connected: {} (target {})", addr, config.target_addr());
                Ok(Self {
                    stream: Some(stream),
                    local: config.source_addr(),
                    remote: config.target_addr(),
                    timeout: config.timeout(),
                    invoke_id: 0,
                    stats: TransportStats::default(),
                })
            }
            Ok(Err(e)) => {
                error!("TCP err: {} - {}", addr, e);
                Err(AdsError::connection(format!(
                    "Failed to connect to {addr}: {e}"
                )))
            }
            Err(_) => {
                warn!("TCP timeout: {}", addr);
                Err(AdsError::timeout(format!("Connection to {addr} timed out")))
            }
        }
    }

    /// Local AMS endpoint
    pub fn local_addr(&self) -> AmsAddr {
        self.local
    }

    /// Remote AMS endpoint
    pub fn remote_addr(&self) -> AmsAddr {
        self.remote
    }

    fn next_invoke_id(&mut self) -> u32 {
        self.invoke_id = self.invoke_id.wrapping_add(1);
        if self.invoke_id == 0 {
            self.invoke_id = 1;
        }
        self.invoke_id
    }

    async fn do_transact(&mut self, request: &AdsRequest) -> AdsResult<AdsResponse> {
        if self.stream.is_none() {
            return Err(AdsError::NotConnected);
        }
        let invoke_id = self.next_invoke_id();

        // Assemble the full frame before touching the socket
        let payload_len = request.encoded_len();
        let mut frame = BytesMut::with_capacity(AMS_TCP_HEADER_LEN + AMS_HEADER_LEN + payload_len);
        AmsTcpHeader::new((AMS_HEADER_LEN + payload_len) as u32).encode(&mut frame);
        AmsHeader::request(
            self.remote,
            self.local,
            request.command_id(),
            payload_len as u32,
            invoke_id,
        )
        .encode(&mut frame);
        request.encode(&mut frame);

        debug!(
            "TX {:?} invoke={} {}B: {}",
            request.command_id(),
            invoke_id,
            frame.len(),
            hex::encode(&frame)
        );

        let io_timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(AdsError::NotConnected)?;

        match timeout(io_timeout, stream.write_all(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(AdsError::io(format!("TCP send error: {e}"))),
            Err(_) => return Err(AdsError::timeout("TCP send timeout")),
        }
        match timeout(io_timeout, stream.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(AdsError::io(format!("TCP flush error: {e}"))),
            Err(_) => return Err(AdsError::timeout("TCP flush timeout")),
        }
        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;

        // Transport header first, then the declared remainder in one piece
        let stream = self.stream.as_mut().ok_or(AdsError::NotConnected)?;
        let mut head = [0u8; AMS_TCP_HEADER_LEN];
        match timeout(io_timeout, stream.read_exact(&mut head)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(AdsError::io(format!("TCP header read error: {e}"))),
            Err(_) => return Err(AdsError::timeout("TCP header read timeout")),
        }
        let tcp_header = AmsTcpHeader::decode(&mut &head[..])?;

        let mut body = vec![0u8; tcp_header.length as usize];
        match timeout(io_timeout, stream.read_exact(&mut body)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(AdsError::io(format!("TCP body read error: {e}"))),
            Err(_) => return Err(AdsError::timeout("TCP body read timeout")),
        }
        self.stats.bytes_received += (AMS_TCP_HEADER_LEN + body.len()) as u64;
        debug!("RX {}B: {}", body.len(), hex::encode(&body));

        let mut buf: &[u8] = &body;
        let header = AmsHeader::decode(&mut buf)?;

        // Hard correlation invariant: AMS is half-duplex per connection, a
        // mismatch means the session has desynchronized. The body is already
        // off the socket; the connection is torn down by the caller.
        if header.invoke_id != invoke_id {
            warn!(
                "invoke id mismatch: sent {}, received {}",
                invoke_id, header.invoke_id
            );
            return Err(AdsError::InvokeIdMismatch {
                sent: invoke_id,
                received: header.invoke_id,
            });
        }

        let header_code = AdsReturnCode::from_wire(header.error_code);
        if !header_code.is_ok() {
            return Err(match header_code {
                AdsReturnCode::Unknown(raw) => {
                    AdsError::protocol(format!("unknown AMS error code 0x{raw:08X}"))
                }
                other => AdsError::Device(other),
            });
        }

        let declared = header.data_length as usize;
        if buf.len() < declared {
            return Err(AdsError::protocol(format!(
                "AMS payload truncated: declared {declared}, got {}",
                buf.len()
            )));
        }
        let trailing = buf.len() - declared;
        if trailing > 0 {
            // The wire occasionally pads; drain instead of failing
            debug!("discarding {} trailing bytes after response payload", trailing);
        }

        AdsResponse::parse(request.command_id(), &buf[..declared])
    }
}

#[async_trait]
impl AmsTransport for TcpTransport {
    async fn transact(&mut self, request: &AdsRequest) -> AdsResult<AdsResponse> {
        match self.do_transact(request).await {
            Ok(response) => {
                self.stats.responses_received += 1;
                Ok(response)
            }
            Err(err) => {
                self.stats.errors += 1;
                if err.needs_reconnect() {
                    // Session is no longer trustworthy
                    self.stream = None;
                }
                Err(err)
            }
        }
    }

    async fn close(&mut self) -> AdsResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("Disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
