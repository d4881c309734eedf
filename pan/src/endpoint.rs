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

//! The packet endpoint boundary towards the underlying network stack.
//!
//! The stack provides registerable packet endpoints with write-to/read-from
//! semantics; everything above (the QUIC layer, the prober) is written
//! against the [`PacketConn`] trait so the stack can be swapped for a test
//! double. [`FilteredPacketConn`] layers path-level access control on the
//! receive side of any endpoint.

use std::net;

use futures::future::BoxFuture;
use pan_proto::{
    address::SocketAddr,
    packet::{DecodeError, Packet},
};
use thiserror::Error;
use tracing::trace;

use crate::filter::PacketFilter;

/// The well-known underlay port of endhosts, used as the next hop when
/// sending within the local domain with an empty path.
pub const UNDERLAY_ENDHOST_PORT: u16 = 30041;

/// Errors raised when sending on a packet endpoint.
#[derive(Debug, Error)]
pub enum PacketSendError {
    /// The endpoint has been closed.
    #[error("endpoint is closed")]
    Closed,
    /// The packet cannot be sent as constructed.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
    /// The underlying socket failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised when receiving on a packet endpoint.
#[derive(Debug, Error)]
pub enum PacketRecvError {
    /// The endpoint has been closed.
    #[error("endpoint is closed")]
    Closed,
    /// An inbound datagram could not be decoded.
    ///
    /// A single malformed datagram must never terminate a receive loop;
    /// callers log and continue.
    #[error("malformed packet: {0}")]
    Malformed(#[from] DecodeError),
    /// The underlying socket failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A registered endpoint on the underlying packet network.
pub trait PacketConn: Send + Sync {
    /// Writes a packet to the given underlay next hop.
    fn write_to(
        &self,
        packet: Packet,
        next_hop: net::SocketAddr,
    ) -> BoxFuture<'_, Result<(), PacketSendError>>;

    /// Reads the next inbound packet together with the underlay address it
    /// arrived from.
    fn read_from(&self) -> BoxFuture<'_, Result<(Packet, net::SocketAddr), PacketRecvError>>;

    /// Returns the local structured address of the endpoint.
    fn local_addr(&self) -> SocketAddr;

    /// Closes the endpoint.
    ///
    /// Idempotent; pending and future reads fail with
    /// [`PacketRecvError::Closed`].
    fn close(&self);
}

impl<C: PacketConn + ?Sized> PacketConn for std::sync::Arc<C> {
    fn write_to(
        &self,
        packet: Packet,
        next_hop: net::SocketAddr,
    ) -> BoxFuture<'_, Result<(), PacketSendError>> {
        (**self).write_to(packet, next_hop)
    }

    fn read_from(&self) -> BoxFuture<'_, Result<(Packet, net::SocketAddr), PacketRecvError>> {
        (**self).read_from()
    }

    fn local_addr(&self) -> SocketAddr {
        (**self).local_addr()
    }

    fn close(&self) {
        (**self).close()
    }
}

/// A [`PacketConn`] that silently drops inbound packets rejected by a
/// [`PacketFilter`].
///
/// Dropped packets are not surfaced as errors; the sender simply observes no
/// reply, mirroring firewall semantics.
pub struct FilteredPacketConn<C> {
    inner: C,
    filter: PacketFilter,
}

impl<C: PacketConn> FilteredPacketConn<C> {
    /// Wraps an endpoint with the given filter.
    pub fn new(inner: C, filter: PacketFilter) -> Self {
        Self { inner, filter }
    }

    /// Returns the filter applied to inbound packets.
    pub fn filter(&self) -> &PacketFilter {
        &self.filter
    }
}

impl<C: PacketConn> PacketConn for FilteredPacketConn<C> {
    fn write_to(
        &self,
        packet: Packet,
        next_hop: net::SocketAddr,
    ) -> BoxFuture<'_, Result<(), PacketSendError>> {
        self.inner.write_to(packet, next_hop)
    }

    fn read_from(&self) -> BoxFuture<'_, Result<(Packet, net::SocketAddr), PacketRecvError>> {
        Box::pin(async move {
            loop {
                let (packet, from) = self.inner.read_from().await?;
                let fingerprint = packet.path.fingerprint();
                if self.filter.filter_packet(&packet, &fingerprint) {
                    return Ok((packet, from));
                }
                trace!(
                    source = %packet.source,
                    fingerprint = %fingerprint.short(),
                    "dropping packet: path not allowed for source domain"
                );
            }
        })
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    fn close(&self) {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use pan_proto::{
        packet::{EchoRequest, Payload},
        path::{DataPlanePath, Path},
    };

    use super::*;
    use crate::{acl::AccessControlList, testing};

    #[tokio::test]
    async fn filtered_conn_drops_unlisted_paths() {
        let local: SocketAddr = "1-ff00:0:110,127.0.0.1:4000".parse().unwrap();
        let remote: SocketAddr = "1-ff00:0:112,127.0.0.2:4000".parse().unwrap();
        let (listener_conn, sender_conn) = testing::conn_pair(local, remote);

        let allowed_path = Path::local(remote.isd_asn());
        let allowed = *allowed_path.fingerprint();
        let acl: AccessControlList = [(remote.isd_asn(), vec![allowed])].into_iter().collect();
        let filtered = FilteredPacketConn::new(listener_conn, PacketFilter::new(Some(acl)));

        let rejected_path = DataPlanePath::Unsupported {
            path_type: 9,
            bytes: bytes::Bytes::from_static(&[1, 2, 3]),
        };
        assert_ne!(rejected_path.fingerprint(), allowed);

        // A packet over an unlisted path, then one over the allowed path.
        for (sequence, path) in [(0u16, rejected_path), (1u16, DataPlanePath::EmptyPath)] {
            let packet = Packet {
                source: remote.endhost_addr(),
                destination: local.endhost_addr(),
                path,
                payload: Payload::EchoRequest(EchoRequest::new(7, sequence, bytes::Bytes::new())),
            };
            sender_conn
                .write_to(packet, "127.0.0.1:4000".parse().unwrap())
                .await
                .unwrap();
        }

        // Only the packet over the allowed path surfaces.
        let (packet, _) = filtered.read_from().await.unwrap();
        assert_eq!(packet.path.fingerprint(), allowed);
        match packet.payload {
            Payload::EchoRequest(echo) => assert_eq!(echo.sequence_number, 1),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
