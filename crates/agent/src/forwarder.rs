//! Payload forwarder -- newline-terminated delivery over TCP or UDP.
//!
//! A fresh socket is opened per payload. There is no pooling and no retry;
//! a failed delivery drops that one payload.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

use loglens_core::metrics as m;
use loglens_core::types::{ForwarderConfig, Protocol};

use crate::error::AgentError;

/// Sends finished payloads to a collector.
#[derive(Debug, Clone)]
pub struct Forwarder {
    connect_timeout: Duration,
}

impl Forwarder {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Delivers `payload`, logging and counting any failure.
    ///
    /// Returns whether the payload was handed to the network.
    pub async fn forward(&self, payload: &str, config: &ForwarderConfig) -> bool {
        match self.send(payload, config).await {
            Ok(()) => {
                metrics::counter!(m::RECORDS_FORWARDED_TOTAL).increment(1);
                true
            }
            Err(e) => {
                tracing::warn!(
                    destination = %config.destination(),
                    protocol = %config.protocol,
                    error = %e,
                    "forwarding failed, payload dropped"
                );
                metrics::counter!(
                    m::FORWARD_FAILURES_TOTAL,
                    m::LABEL_PROTOCOL => config.protocol.to_string()
                )
                .increment(1);
                false
            }
        }
    }

    /// Delivers `payload` followed by a newline.
    pub async fn send(&self, payload: &str, config: &ForwarderConfig) -> Result<(), AgentError> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload.as_bytes());
        frame.push(b'\n');

        let addr = resolve(config).await?;
        let sent = match config.protocol {
            Protocol::Tcp => self.send_tcp(addr, &frame).await,
            Protocol::Udp => send_udp(addr, &frame).await,
        };
        sent.map_err(|reason| AgentError::Forward {
            destination: config.destination(),
            reason,
        })
    }

    async fn send_tcp(&self, addr: SocketAddr, frame: &[u8]) -> Result<(), String> {
        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| format!("connect timed out after {:?}", self.connect_timeout))?
            .map_err(|e| format!("connect failed: {e}"))?;

        stream
            .write_all(frame)
            .await
            .map_err(|e| format!("write failed: {e}"))?;
        stream
            .shutdown()
            .await
            .map_err(|e| format!("shutdown failed: {e}"))?;
        Ok(())
    }
}

async fn send_udp(addr: SocketAddr, frame: &[u8]) -> Result<(), String> {
    let bind_addr = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    socket
        .send_to(frame, addr)
        .await
        .map_err(|e| format!("send failed: {e}"))?;
    Ok(())
}

async fn resolve(config: &ForwarderConfig) -> Result<SocketAddr, AgentError> {
    let unresolved = |reason: String| AgentError::Forward {
        destination: config.destination(),
        reason,
    };

    tokio::net::lookup_host((config.ip.as_str(), config.port))
        .await
        .map_err(|e| unresolved(format!("address resolution failed: {e}")))?
        .next()
        .ok_or_else(|| unresolved("address resolved to nothing".to_owned()))
}
