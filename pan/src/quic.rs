// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Path-aware QUIC endpoints.
//!
//! quinn addresses peers by `std::net::SocketAddr`, while this layer
//! addresses them by structured address and forwarding path. An
//! [`AddressTranslator`] maps structured addresses to synthetic IPv6
//! addresses for quinn's benefit; a [`quinn::AsyncUdpSocket`] implementation
//! over a [`PacketConn`] attaches paths on the way out and applies the
//! [`PacketFilter`] to everything on the way in, so a listener only ever
//! sees traffic over acceptable paths.
//!
//! Outbound paths come from the reverse paths of inbound packets where
//! available, and from the injected [`PathSelector`] otherwise.

use std::{
    collections::HashMap,
    fmt::{self, Debug},
    hash::{BuildHasher, Hash as _, Hasher as _},
    io,
    net::{IpAddr, Ipv6Addr},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, ready},
};

use bytes::{BufMut as _, Bytes};
use foldhash::fast::FixedState;
use futures::future::BoxFuture;
use pan_proto::{
    address::{EndhostAddr, IsdAsn, SocketAddr},
    packet::{Packet, Payload, UdpDatagram},
    path::DataPlanePath,
};
use quinn::udp::{RecvMeta, Transmit};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::{
    dial::{Connection, DialError, Dialer, PathSelector},
    endpoint::{PacketConn, PacketRecvError},
    filter::PacketFilter,
};

/// ALPN protocol id for the single-stream tunnel protocol.
pub const SINGLE_STREAM_ALPN: &[u8] = b"pan-ss";

const INBOUND_CHANNEL_CAPACITY: usize = 128;

/// Translates between structured addresses and the synthetic IPv6 addresses
/// quinn routes by.
///
/// The mapping is deterministic (a fixed-seed hash of the structured
/// address), so both directions agree without coordination.
pub struct AddressTranslator {
    build_hasher: FixedState,
    addr_map: Mutex<HashMap<Ipv6Addr, EndhostAddr>>,
}

impl Debug for AddressTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AddressTranslator {{ {} }}",
            self.addr_map
                .lock()
                .unwrap()
                .iter()
                .map(|(ip, addr)| format!("{ip} -> {addr}"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Default for AddressTranslator {
    fn default() -> Self {
        Self {
            build_hasher: FixedState::with_seed(42),
            addr_map: Mutex::new(HashMap::new()),
        }
    }
}

impl AddressTranslator {
    fn synthetic_address(&self, addr: EndhostAddr) -> Ipv6Addr {
        let mut hasher = self.build_hasher.build_hasher();
        hasher.write_u64(addr.isd_asn().to_u64());
        addr.host().hash(&mut hasher);
        Ipv6Addr::from(hasher.finish() as u128)
    }

    /// Registers the structured address and returns the synthetic IP for it.
    pub fn register(&self, addr: EndhostAddr) -> IpAddr {
        let ip = self.synthetic_address(addr);
        self.addr_map.lock().unwrap().entry(ip).or_insert(addr);
        IpAddr::V6(ip)
    }

    /// Looks up the structured address for a synthetic IP.
    pub fn lookup(&self, ip: IpAddr) -> Option<EndhostAddr> {
        let IpAddr::V6(ip) = ip else {
            return None;
        };
        self.addr_map.lock().unwrap().get(&ip).copied()
    }
}

/// Reverse paths learned from inbound packets, keyed by remote domain.
#[derive(Default)]
struct ReversePathRegistry {
    paths: Mutex<HashMap<IsdAsn, (DataPlanePath, std::net::SocketAddr)>>,
}

impl ReversePathRegistry {
    fn register(&self, remote: IsdAsn, path: DataPlanePath, underlay: std::net::SocketAddr) {
        self.paths.lock().unwrap().insert(remote, (path, underlay));
    }

    fn lookup(&self, remote: IsdAsn) -> Option<(DataPlanePath, std::net::SocketAddr)> {
        self.paths.lock().unwrap().get(&remote).cloned()
    }
}

struct OutboundItem {
    packet: Packet,
    next_hop: std::net::SocketAddr,
}

struct InboundItem {
    remote: std::net::SocketAddr,
    data: Bytes,
}

/// A [`quinn::AsyncUdpSocket`] over a packet endpoint.
struct PanUdpSocket {
    local_addr: SocketAddr,
    local_ip: IpAddr,
    translator: Arc<AddressTranslator>,
    selector: Arc<dyn PathSelector>,
    paths: Arc<ReversePathRegistry>,
    outbound: mpsc::UnboundedSender<OutboundItem>,
    inbound: Mutex<mpsc::Receiver<InboundItem>>,
}

impl Debug for PanUdpSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PanUdpSocket({})", self.local_addr)
    }
}

#[derive(Debug)]
struct AlwaysWritable;

impl quinn::UdpPoller for AlwaysWritable {
    fn poll_writable(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<io::Result<()>> {
        // Outbound packets go through an unbounded queue drained by the
        // writer task, so the socket is always writable.
        Poll::Ready(Ok(()))
    }
}

impl PanUdpSocket {
    /// Picks the path and underlay next hop towards the destination.
    fn route_to(&self, destination: SocketAddr) -> Option<(DataPlanePath, std::net::SocketAddr)> {
        if let Some(found) = self.paths.lookup(destination.isd_asn()) {
            return Some(found);
        }
        if let Some(path) = self.selector.path_to(destination.isd_asn()) {
            if let Some(next_hop) = path.underlay_next_hop {
                return Some((path.data_plane_path.clone(), next_hop));
            }
            if path.is_empty() && self.local_addr.isd_asn() == destination.isd_asn() {
                return Some((
                    DataPlanePath::EmptyPath,
                    std::net::SocketAddr::new(destination.host(), destination.port()),
                ));
            }
            return None;
        }
        if self.local_addr.isd_asn() == destination.isd_asn() {
            return Some((
                DataPlanePath::EmptyPath,
                std::net::SocketAddr::new(destination.host(), destination.port()),
            ));
        }
        None
    }
}

impl quinn::AsyncUdpSocket for PanUdpSocket {
    fn create_io_poller(self: Arc<Self>) -> Pin<Box<dyn quinn::UdpPoller>> {
        Box::pin(AlwaysWritable)
    }

    fn try_send(&self, transmit: &Transmit) -> io::Result<()> {
        let destination = self
            .translator
            .lookup(transmit.destination.ip())
            .ok_or_else(|| {
                io::Error::other(format!(
                    "no structured address for {}",
                    transmit.destination.ip()
                ))
            })?;
        let destination = SocketAddr::new(destination, transmit.destination.port());

        let Some((path, next_hop)) = self.route_to(destination) else {
            // No path yet; drop and let quinn retransmit once one is known.
            trace!(%destination, "no path towards destination, dropping transmit");
            return Ok(());
        };

        let packet = Packet {
            source: self.local_addr.endhost_addr(),
            destination: destination.endhost_addr(),
            path,
            payload: Payload::Udp(UdpDatagram {
                src_port: self.local_addr.port(),
                dst_port: destination.port(),
                payload: Bytes::copy_from_slice(transmit.contents),
            }),
        };
        self.outbound
            .send(OutboundItem { packet, next_hop })
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn poll_recv(
        &self,
        cx: &mut Context,
        bufs: &mut [io::IoSliceMut<'_>],
        meta: &mut [RecvMeta],
    ) -> Poll<io::Result<usize>> {
        match ready!(self.inbound.lock().unwrap().poll_recv(cx)) {
            Some(item) => {
                meta[0] = RecvMeta {
                    addr: item.remote,
                    len: item.data.len(),
                    stride: item.data.len(),
                    ecn: None,
                    dst_ip: Some(self.local_ip),
                };
                bufs[0].as_mut().put_slice(&item.data);
                Poll::Ready(Ok(1))
            }
            None => {
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "endpoint closed",
                )))
            }
        }
    }

    fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        Ok(std::net::SocketAddr::new(
            self.local_ip,
            self.local_addr.port(),
        ))
    }
}

/// Errors raised when building TLS configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Generating the self-signed certificate failed.
    #[error("generating certificate: {0}")]
    Certificate(#[from] rcgen::Error),
    /// The TLS configuration was rejected.
    #[error("TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
    /// The TLS configuration is not usable for QUIC.
    #[error("TLS configuration not usable for QUIC: {0}")]
    Quic(#[from] quinn::crypto::rustls::NoInitialCipherSuite),
}

/// Builds a QUIC server configuration with a freshly generated self-signed
/// certificate and the given ALPN protocol.
pub fn self_signed_server_config(alpn: &[u8]) -> Result<quinn::ServerConfig, TlsError> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["pan".to_string()])?;
    let key = rustls::pki_types::PrivateKeyDer::Pkcs8(rustls::pki_types::PrivatePkcs8KeyDer::from(
        key_pair.serialize_der(),
    ));

    let mut tls = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)?;
    tls.alpn_protocols = vec![alpn.to_vec()];

    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls)?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(crypto)))
}

/// Errors raised when accepting a session.
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The QUIC handshake failed.
    #[error(transparent)]
    Connection(#[from] quinn::ConnectionError),
    /// The peer's address was never registered with the translator.
    #[error("unknown peer address {0}")]
    UnknownPeer(std::net::SocketAddr),
}

/// A path-aware QUIC endpoint over a packet endpoint.
///
/// Dropping the endpoint stops its pump tasks and closes the underlying
/// packet endpoint.
pub struct Endpoint {
    inner: quinn::Endpoint,
    translator: Arc<AddressTranslator>,
    local_addr: SocketAddr,
    conn: Arc<dyn PacketConn>,
    cancel: CancellationToken,
}

impl Endpoint {
    /// Creates an endpoint over the given packet endpoint.
    ///
    /// Inbound packets pass `filter` before reaching quinn; outbound packets
    /// use reverse paths of inbound traffic or fall back to `selector`. Pass
    /// a server configuration to accept sessions. Must run within a tokio
    /// runtime; two background tasks pump the packet endpoint.
    pub fn new(
        conn: Arc<dyn PacketConn>,
        filter: PacketFilter,
        selector: Arc<dyn PathSelector>,
        server_config: Option<quinn::ServerConfig>,
    ) -> io::Result<Self> {
        let local_addr = conn.local_addr();
        let translator = Arc::new(AddressTranslator::default());
        let local_ip = translator.register(local_addr.endhost_addr());
        let paths = Arc::new(ReversePathRegistry::default());
        let cancel = CancellationToken::new();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        tokio::spawn(inbound_pump(
            conn.clone(),
            filter,
            translator.clone(),
            paths.clone(),
            local_addr,
            inbound_tx,
            cancel.clone(),
        ));
        tokio::spawn(outbound_pump(conn.clone(), outbound_rx, cancel.clone()));

        let socket = Arc::new(PanUdpSocket {
            local_addr,
            local_ip,
            translator: translator.clone(),
            selector,
            paths,
            outbound: outbound_tx,
            inbound: Mutex::new(inbound_rx),
        });

        let inner = quinn::Endpoint::new_with_abstract_socket(
            quinn::EndpointConfig::default(),
            server_config,
            socket,
            Arc::new(quinn::TokioRuntime),
        )?;

        Ok(Self {
            inner,
            translator,
            local_addr,
            conn,
            cancel,
        })
    }

    /// Returns the local structured address of the endpoint.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sets the default QUIC client configuration used by
    /// [`connect`][Self::connect].
    pub fn set_default_client_config(&mut self, config: quinn::ClientConfig) {
        self.inner.set_default_client_config(config);
    }

    /// Connects to the given structured address.
    pub fn connect(
        &self,
        remote: SocketAddr,
        server_name: &str,
    ) -> Result<quinn::Connecting, quinn::ConnectError> {
        let remote_ip = self.translator.register(remote.endhost_addr());
        self.inner.connect(
            std::net::SocketAddr::new(remote_ip, remote.port()),
            server_name,
        )
    }

    /// Accepts the next incoming session.
    ///
    /// Returns None when the endpoint is closed.
    pub async fn accept(&self) -> Option<Result<(quinn::Connection, SocketAddr), AcceptError>> {
        let incoming = self.inner.accept().await?;
        let remote_address = incoming.remote_address();
        Some(async {
            let connection = incoming.await?;
            let remote = self
                .translator
                .lookup(remote_address.ip())
                .ok_or(AcceptError::UnknownPeer(remote_address))?;
            Ok((
                connection,
                SocketAddr::new(remote, remote_address.port()),
            ))
        }
        .await)
    }

    /// Waits until all connections on the endpoint have cleanly shut down.
    pub async fn wait_idle(&self) {
        self.inner.wait_idle().await;
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.conn.close();
    }
}

/// Opens a QUIC session to the remote and returns its single stream as a
/// byte stream.
pub async fn dial_single_stream(
    endpoint: &Endpoint,
    remote: SocketAddr,
    server_name: &str,
) -> Result<Connection, DialError> {
    let connecting = endpoint
        .connect(remote, server_name)
        .map_err(|error| DialError::Connect(error.to_string()))?;
    let connection = connecting
        .await
        .map_err(|error| DialError::Connect(error.to_string()))?;
    let (send, recv) = connection
        .open_bi()
        .await
        .map_err(|error| DialError::Connect(error.to_string()))?;
    Ok(Box::new(tokio::io::join(recv, send)))
}

/// A [`Dialer`] opening path-aware QUIC single-stream connections.
///
/// The address strings it receives are the canonical `ia,host:port` form
/// produced by [`Transport`][crate::dial::Transport]; path selection is the
/// endpoint's.
pub struct QuicDialer {
    endpoint: Arc<Endpoint>,
    server_name: String,
}

impl QuicDialer {
    /// Creates a dialer over the given endpoint.
    pub fn new(endpoint: Arc<Endpoint>, server_name: impl Into<String>) -> Self {
        Self {
            endpoint,
            server_name: server_name.into(),
        }
    }
}

impl Dialer for QuicDialer {
    fn dial(
        &self,
        _network: &'static str,
        address: String,
    ) -> BoxFuture<'static, Result<Connection, DialError>> {
        let endpoint = self.endpoint.clone();
        let server_name = self.server_name.clone();
        Box::pin(async move {
            let remote: SocketAddr = address
                .parse()
                .map_err(|_| DialError::InvalidUrl(address.clone()))?;
            dial_single_stream(&endpoint, remote, &server_name).await
        })
    }
}

/// Feeds filtered inbound datagrams to quinn and learns reverse paths.
async fn inbound_pump(
    conn: Arc<dyn PacketConn>,
    filter: PacketFilter,
    translator: Arc<AddressTranslator>,
    paths: Arc<ReversePathRegistry>,
    local_addr: SocketAddr,
    inbound: mpsc::Sender<InboundItem>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            received = conn.read_from() => received,
        };
        let (packet, from) = match received {
            Ok(received) => received,
            Err(PacketRecvError::Malformed(error)) => {
                trace!(error = %error, "dropping malformed datagram");
                continue;
            }
            Err(error) => {
                trace!(error = %error, "packet endpoint closed, stopping inbound pump");
                return;
            }
        };

        let fingerprint = packet.path.fingerprint();
        if !filter.filter_packet(&packet, &fingerprint) {
            trace!(
                source = %packet.source,
                fingerprint = %fingerprint.short(),
                "dropping packet: path not allowed for source domain"
            );
            continue;
        }

        let Payload::Udp(datagram) = packet.payload else {
            trace!(source = %packet.source, "ignoring non-datagram payload");
            continue;
        };
        if datagram.dst_port != local_addr.port() {
            trace!(
                source = %packet.source,
                dst_port = datagram.dst_port,
                "ignoring datagram for other port"
            );
            continue;
        }

        match packet.path.to_reversed() {
            Ok(reversed) => paths.register(packet.source.isd_asn(), reversed, from),
            Err(error) => trace!(error = %error, "cannot reverse path for registration"),
        }

        let remote_ip = translator.register(packet.source);
        let item = InboundItem {
            remote: std::net::SocketAddr::new(remote_ip, datagram.src_port),
            data: datagram.payload,
        };
        tokio::select! {
            _ = cancel.cancelled() => return,
            sent = inbound.send(item) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

/// Writes queued outbound packets to the packet endpoint.
async fn outbound_pump(
    conn: Arc<dyn PacketConn>,
    mut outbound: mpsc::UnboundedReceiver<OutboundItem>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return,
            item = outbound.recv() => item,
        };
        let Some(OutboundItem { packet, next_hop }) = item else {
            return;
        };
        if let Err(error) = conn.write_to(packet, next_hop).await {
            warn!(error = %error, "sending packet failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translator_is_deterministic_and_invertible() {
        let translator = AddressTranslator::default();
        let addr: EndhostAddr = "1-ff00:0:110,10.0.0.1".parse().unwrap();

        let ip = translator.register(addr);
        assert_eq!(translator.register(addr), ip);
        assert_eq!(translator.lookup(ip), Some(addr));
        assert_eq!(
            translator.lookup("127.0.0.1".parse::<IpAddr>().unwrap()),
            None
        );
    }

    #[test]
    fn distinct_addresses_map_to_distinct_ips() {
        let translator = AddressTranslator::default();
        let a = translator.register("1-ff00:0:110,10.0.0.1".parse().unwrap());
        let b = translator.register("1-ff00:0:112,10.0.0.1".parse().unwrap());
        let c = translator.register("1-ff00:0:110,10.0.0.2".parse().unwrap());
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
