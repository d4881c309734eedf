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

//! A UDP-backed packet endpoint.

use std::net;

use bytes::Bytes;
use futures::future::BoxFuture;
use pan_proto::{
    address::{EndhostAddr, SocketAddr},
    packet::Packet,
    wire_encoding::{WireDecode, WireEncode},
};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::endpoint::{PacketConn, PacketRecvError, PacketSendError};

const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// A packet endpoint registered on a UDP underlay socket.
///
/// Packets are framed with the endpoint encoding from `pan-proto` and sent
/// to the underlay next hop chosen by the caller.
pub struct UdpPacketConn {
    socket: UdpSocket,
    local_addr: SocketAddr,
    closed: CancellationToken,
}

impl UdpPacketConn {
    /// Binds an endpoint for the given endhost on the given underlay
    /// address.
    ///
    /// The endpoint's structured port is the port the underlay socket bound
    /// to, so binding port 0 assigns an ephemeral one.
    pub async fn bind(local: EndhostAddr, bind_addr: net::SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let port = socket.local_addr()?.port();
        Ok(Self {
            socket,
            local_addr: SocketAddr::new(local, port),
            closed: CancellationToken::new(),
        })
    }
}

impl PacketConn for UdpPacketConn {
    fn write_to(
        &self,
        packet: Packet,
        next_hop: net::SocketAddr,
    ) -> BoxFuture<'_, Result<(), PacketSendError>> {
        Box::pin(async move {
            if self.closed.is_cancelled() {
                return Err(PacketSendError::Closed);
            }
            let encoded = packet.encode_to_bytes();
            self.socket
                .send_to(&encoded, next_hop)
                .await
                .map_err(|e| {
                    use std::io::ErrorKind::*;
                    match e.kind() {
                        ConnectionAborted | ConnectionReset | BrokenPipe => PacketSendError::Closed,
                        _ => PacketSendError::Io(e),
                    }
                })?;
            Ok(())
        })
    }

    fn read_from(&self) -> BoxFuture<'_, Result<(Packet, net::SocketAddr), PacketRecvError>> {
        Box::pin(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
            tokio::select! {
                _ = self.closed.cancelled() => Err(PacketRecvError::Closed),
                received = self.socket.recv_from(&mut buffer) => {
                    let (length, from) = received?;
                    let mut data = Bytes::copy_from_slice(&buffer[..length]);
                    let packet = Packet::decode(&mut data)?;
                    Ok((packet, from))
                }
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

impl Drop for UdpPacketConn {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}
