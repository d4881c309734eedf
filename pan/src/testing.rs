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

//! In-memory test doubles for the packet endpoint boundary.

use std::{net, sync::Arc};

use futures::future::BoxFuture;
use pan_proto::{address::SocketAddr, packet::Packet};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::endpoint::{PacketConn, PacketRecvError, PacketSendError};

/// One side of an in-memory endpoint pair.
///
/// Packets written on one side surface on the other, regardless of the next
/// hop passed to `write_to`; the underlay source reported to the reader is a
/// loopback address carrying the writer's structured port.
pub struct MemoryConn {
    local_addr: SocketAddr,
    underlay_addr: net::SocketAddr,
    to_peer: mpsc::UnboundedSender<(Packet, net::SocketAddr)>,
    from_peer: Mutex<mpsc::UnboundedReceiver<(Packet, net::SocketAddr)>>,
    closed: CancellationToken,
}

/// Creates a connected pair of in-memory endpoints.
pub fn conn_pair(a: SocketAddr, b: SocketAddr) -> (Arc<MemoryConn>, Arc<MemoryConn>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let conn = |local_addr: SocketAddr, to_peer, from_peer| {
        Arc::new(MemoryConn {
            local_addr,
            underlay_addr: net::SocketAddr::new(
                net::IpAddr::V4(net::Ipv4Addr::LOCALHOST),
                local_addr.port(),
            ),
            to_peer,
            from_peer: Mutex::new(from_peer),
            closed: CancellationToken::new(),
        })
    };
    (conn(a, b_tx, a_rx), conn(b, a_tx, b_rx))
}

impl PacketConn for MemoryConn {
    fn write_to(
        &self,
        packet: Packet,
        _next_hop: net::SocketAddr,
    ) -> BoxFuture<'_, Result<(), PacketSendError>> {
        Box::pin(async move {
            if self.closed.is_cancelled() {
                return Err(PacketSendError::Closed);
            }
            self.to_peer
                .send((packet, self.underlay_addr))
                .map_err(|_| PacketSendError::Closed)
        })
    }

    fn read_from(&self) -> BoxFuture<'_, Result<(Packet, net::SocketAddr), PacketRecvError>> {
        Box::pin(async move {
            let mut receiver = self.from_peer.lock().await;
            tokio::select! {
                _ = self.closed.cancelled() => Err(PacketRecvError::Closed),
                packet = receiver.recv() => packet.ok_or(PacketRecvError::Closed),
            }
        })
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
