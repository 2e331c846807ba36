//! High-level client API.

use crate::error::ClientError;
use slpd_protocol::message::{ServiceRequest, ServiceTypeRequest};
use slpd_protocol::{FunctionId, Header, ServiceReply, ServiceTypeReply, UrlEntry};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Responder address.
    pub server: SocketAddr,
    /// How long to wait for a matching reply.
    pub timeout: Duration,
    /// Language tag sent in every request.
    pub language_tag: String,
    /// Scope list sent in every request.
    pub scope_list: String,
}

impl ClientConfig {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            timeout: Duration::from_secs(3),
            language_tag: "en".to_string(),
            scope_list: "DEFAULT".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_language_tag(mut self, tag: impl Into<String>) -> Self {
        self.language_tag = tag.into();
        self
    }

    pub fn with_scope_list(mut self, scopes: impl Into<String>) -> Self {
        self.scope_list = scopes.into();
        self
    }
}

/// Unicast SLP client.
///
/// Each request uses a fresh socket and transaction id. Datagrams from other
/// peers or carrying another transaction id are discarded.
pub struct SlpClient {
    config: ClientConfig,
    next_xid: AtomicU16,
}

impl SlpClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            next_xid: AtomicU16::new(1),
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn header(&self, function: FunctionId) -> Header {
        let xid = self.next_xid.fetch_add(1, Ordering::Relaxed);
        Header::new(function, xid, &self.config.language_tag)
    }

    /// Lists the service types the responder advertises.
    pub async fn service_types(&self) -> Result<Vec<String>, ClientError> {
        let header = self.header(FunctionId::SrvTypeRqst);
        let request = ServiceTypeRequest::new(self.config.scope_list.clone()).encode(&header)?;

        let reply = self.request(&request, header.xid).await?;
        Ok(ServiceTypeReply::decode(&reply)?.service_types)
    }

    /// Looks up the URLs of one service type, e.g. `service:obmc_console`.
    pub async fn find_services(&self, service_type: &str) -> Result<Vec<UrlEntry>, ClientError> {
        let header = self.header(FunctionId::SrvRqst);
        let request = ServiceRequest::new(service_type.to_string(), self.config.scope_list.clone())
            .encode(&header)?;

        let reply = self.request(&request, header.xid).await?;
        Ok(ServiceReply::decode(&reply)?.urls)
    }

    async fn request(&self, datagram: &[u8], xid: u16) -> Result<Vec<u8>, ClientError> {
        let local: SocketAddr = if self.config.server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.send_to(datagram, self.config.server).await?;
        tracing::debug!(
            "Sent {} bytes to {} (xid {})",
            datagram.len(),
            self.config.server,
            xid
        );

        tokio::time::timeout(self.config.timeout, self.receive_reply(&socket, xid))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn receive_reply(&self, socket: &UdpSocket, xid: u16) -> Result<Vec<u8>, ClientError> {
        let mut buf = vec![0u8; DEFAULT_RECV_BUFFER_SIZE];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            if peer != self.config.server {
                tracing::debug!("Discarding datagram from unexpected peer {}", peer);
                continue;
            }
            let reply_xid = Header::salvage(&buf[..len]).xid;
            if reply_xid != xid {
                tracing::debug!("Discarding reply with xid {} (expected {})", reply_xid, xid);
                continue;
            }
            return Ok(buf[..len].to_vec());
        }
    }
}
