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

//! Packets as exchanged with a packet endpoint.
//!
//! A [`Packet`] pairs the source and destination endhost addresses with the
//! traversed (or to be used) [data plane path][DataPlanePath] and a
//! [`Payload`]. The payload is a tagged union over the datagram and
//! diagnostic message kinds an endhost deals with; unknown kinds survive
//! decoding as [`Payload::Other`] so a single unrecognized packet never
//! poisons a receive loop.
//!
//! The encoding implemented here is the framing used between the endpoint
//! glue and the network stack; the network-facing dataplane format is owned
//! by the underlying stack.

use std::net::IpAddr;

use bytes::{Buf, BufMut, Bytes};
use thiserror::Error;

use crate::{
    address::{EndhostAddr, IsdAsn},
    path::{DataPlanePath, PathParseError},
    wire_encoding::{WireDecode, WireEncode},
};

/// Instances of an object associated with both a source and destination
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByEndpoint<T> {
    /// The value for the source.
    pub source: T,
    /// The value for the destination.
    pub destination: T,
}

impl<T> ByEndpoint<T> {
    /// Swaps source and destination.
    pub fn into_reversed(self) -> Self {
        Self {
            source: self.destination,
            destination: self.source,
        }
    }
}

impl<T: Clone> ByEndpoint<T> {
    /// Creates a new instance where both the source and destination have the
    /// same value.
    pub fn with_cloned(source_and_destination: T) -> Self {
        Self {
            destination: source_and_destination.clone(),
            source: source_and_destination,
        }
    }
}

impl<T: PartialEq> ByEndpoint<T> {
    /// Returns true iff source and destination are equal.
    pub fn are_equal(&self) -> bool {
        self.source == self.destination
    }
}

/// Payload kind tags on the wire.
mod kind {
    pub const UDP: u8 = 0;
    pub const ECHO_REQUEST: u8 = 1;
    pub const ECHO_REPLY: u8 = 2;
    pub const EXTERNAL_INTERFACE_DOWN: u8 = 3;
    pub const INTERNAL_CONNECTIVITY_DOWN: u8 = 4;
}

/// A UDP datagram payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    /// The sending application's port.
    pub src_port: u16,
    /// The receiving application's port.
    pub dst_port: u16,
    /// The application data.
    pub payload: Bytes,
}

/// An echo request, as emitted by a prober.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    /// Identifier distinguishing the requesting prober from others sharing
    /// the stack.
    pub identifier: u16,
    /// Sequence number chosen by the prober.
    pub sequence_number: u16,
    /// Opaque probe data, echoed back verbatim.
    pub data: Bytes,
}

impl EchoRequest {
    /// Creates a new echo request.
    pub fn new(identifier: u16, sequence_number: u16, data: Bytes) -> Self {
        Self {
            identifier,
            sequence_number,
            data,
        }
    }
}

/// An echo reply mirroring a previously received [`EchoRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    /// Identifier copied from the request.
    pub identifier: u16,
    /// Sequence number copied from the request.
    pub sequence_number: u16,
    /// Probe data copied from the request.
    pub data: Bytes,
}

impl EchoReply {
    /// Creates a new echo reply.
    pub fn new(identifier: u16, sequence_number: u16, data: Bytes) -> Self {
        Self {
            identifier,
            sequence_number,
            data,
        }
    }
}

/// Notification that a link between two routing domains is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalInterfaceDown {
    /// The domain reporting the failure.
    pub isd_asn: IsdAsn,
    /// The identifier of the failed interface.
    pub interface: u64,
}

/// Notification that connectivity within a routing domain is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalConnectivityDown {
    /// The domain reporting the failure.
    pub isd_asn: IsdAsn,
    /// The ingress interface of the broken connection.
    pub ingress: u64,
    /// The egress interface of the broken connection.
    pub egress: u64,
}

/// The payload of a [`Packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A UDP datagram.
    Udp(UdpDatagram),
    /// An echo request.
    EchoRequest(EchoRequest),
    /// An echo reply.
    EchoReply(EchoReply),
    /// An inter-domain link failure notification.
    ExternalInterfaceDown(ExternalInterfaceDown),
    /// An intra-domain connectivity failure notification.
    InternalConnectivityDown(InternalConnectivityDown),
    /// A payload of unrecognized kind, carried opaquely.
    Other {
        /// The unrecognized kind tag.
        kind: u8,
        /// The raw payload bytes.
        data: Bytes,
    },
}

impl From<UdpDatagram> for Payload {
    fn from(value: UdpDatagram) -> Self {
        Self::Udp(value)
    }
}

impl From<EchoRequest> for Payload {
    fn from(value: EchoRequest) -> Self {
        Self::EchoRequest(value)
    }
}

impl From<EchoReply> for Payload {
    fn from(value: EchoReply) -> Self {
        Self::EchoReply(value)
    }
}

impl From<ExternalInterfaceDown> for Payload {
    fn from(value: ExternalInterfaceDown) -> Self {
        Self::ExternalInterfaceDown(value)
    }
}

impl From<InternalConnectivityDown> for Payload {
    fn from(value: InternalConnectivityDown) -> Self {
        Self::InternalConnectivityDown(value)
    }
}

impl Payload {
    fn kind(&self) -> u8 {
        match self {
            Self::Udp(_) => kind::UDP,
            Self::EchoRequest(_) => kind::ECHO_REQUEST,
            Self::EchoReply(_) => kind::ECHO_REPLY,
            Self::ExternalInterfaceDown(_) => kind::EXTERNAL_INTERFACE_DOWN,
            Self::InternalConnectivityDown(_) => kind::INTERNAL_CONNECTIVITY_DOWN,
            Self::Other { kind, .. } => *kind,
        }
    }
}

/// Errors raised when decoding a [`Packet`] or its constituents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The provided bytes did not include the full packet.
    #[error("the provided bytes did not include the full packet")]
    PacketEmptyOrTruncated,
    /// An address carried an unknown host type tag.
    #[error("unknown host address type {0}")]
    InvalidHostType(u8),
    /// The path header could not be decoded.
    #[error("invalid path header: {0}")]
    InvalidPath(#[from] PathParseError),
}

/// The unit of data exchanged with a packet endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The structured address of the sending endhost.
    pub source: EndhostAddr,
    /// The structured address of the receiving endhost.
    pub destination: EndhostAddr,
    /// For inbound packets, the path the packet traversed; for outbound
    /// packets, the path it will use.
    pub path: DataPlanePath,
    /// The packet's payload.
    pub payload: Payload,
}

const HOST_TYPE_IPV4: u8 = 4;
const HOST_TYPE_IPV6: u8 = 6;

fn encoded_host_length(host: &IpAddr) -> usize {
    match host {
        IpAddr::V4(_) => 1 + 4,
        IpAddr::V6(_) => 1 + 16,
    }
}

fn encode_address<B: BufMut>(address: &EndhostAddr, buffer: &mut B) {
    buffer.put_u64(address.isd_asn().to_u64());
    match address.host() {
        IpAddr::V4(host) => {
            buffer.put_u8(HOST_TYPE_IPV4);
            buffer.put_slice(&host.octets());
        }
        IpAddr::V6(host) => {
            buffer.put_u8(HOST_TYPE_IPV6);
            buffer.put_slice(&host.octets());
        }
    }
}

fn decode_address(data: &mut Bytes) -> Result<EndhostAddr, DecodeError> {
    if data.remaining() < 8 + 1 {
        return Err(DecodeError::PacketEmptyOrTruncated);
    }
    let isd_asn = IsdAsn(data.get_u64());
    let host = match data.get_u8() {
        HOST_TYPE_IPV4 => {
            if data.remaining() < 4 {
                return Err(DecodeError::PacketEmptyOrTruncated);
            }
            let mut octets = [0u8; 4];
            data.copy_to_slice(&mut octets);
            IpAddr::from(octets)
        }
        HOST_TYPE_IPV6 => {
            if data.remaining() < 16 {
                return Err(DecodeError::PacketEmptyOrTruncated);
            }
            let mut octets = [0u8; 16];
            data.copy_to_slice(&mut octets);
            IpAddr::from(octets)
        }
        other => return Err(DecodeError::InvalidHostType(other)),
    };
    Ok(EndhostAddr::new(isd_asn, host))
}

impl WireEncode for Payload {
    fn encoded_length(&self) -> usize {
        1 + match self {
            Self::Udp(datagram) => 4 + datagram.payload.len(),
            Self::EchoRequest(echo) => 4 + echo.data.len(),
            Self::EchoReply(echo) => 4 + echo.data.len(),
            Self::ExternalInterfaceDown(_) => 16,
            Self::InternalConnectivityDown(_) => 24,
            Self::Other { data, .. } => data.len(),
        }
    }

    fn encode_to<B: BufMut>(&self, buffer: &mut B) {
        buffer.put_u8(self.kind());
        match self {
            Self::Udp(datagram) => {
                buffer.put_u16(datagram.src_port);
                buffer.put_u16(datagram.dst_port);
                buffer.put_slice(&datagram.payload);
            }
            Self::EchoRequest(EchoRequest {
                identifier,
                sequence_number,
                data,
            })
            | Self::EchoReply(EchoReply {
                identifier,
                sequence_number,
                data,
            }) => {
                buffer.put_u16(*identifier);
                buffer.put_u16(*sequence_number);
                buffer.put_slice(data);
            }
            Self::ExternalInterfaceDown(notification) => {
                buffer.put_u64(notification.isd_asn.to_u64());
                buffer.put_u64(notification.interface);
            }
            Self::InternalConnectivityDown(notification) => {
                buffer.put_u64(notification.isd_asn.to_u64());
                buffer.put_u64(notification.ingress);
                buffer.put_u64(notification.egress);
            }
            Self::Other { data, .. } => buffer.put_slice(data),
        }
    }
}

impl WireDecode for Payload {
    type Error = DecodeError;

    /// Decodes a payload, consuming the remainder of the buffer.
    fn decode(data: &mut Bytes) -> Result<Self, Self::Error> {
        if data.remaining() < 1 {
            return Err(DecodeError::PacketEmptyOrTruncated);
        }
        let kind = data.get_u8();
        match kind {
            kind::UDP => {
                if data.remaining() < 4 {
                    return Err(DecodeError::PacketEmptyOrTruncated);
                }
                Ok(Self::Udp(UdpDatagram {
                    src_port: data.get_u16(),
                    dst_port: data.get_u16(),
                    payload: data.split_off(0),
                }))
            }
            kind::ECHO_REQUEST | kind::ECHO_REPLY => {
                if data.remaining() < 4 {
                    return Err(DecodeError::PacketEmptyOrTruncated);
                }
                let identifier = data.get_u16();
                let sequence_number = data.get_u16();
                let payload_data = data.split_off(0);
                Ok(if kind == kind::ECHO_REQUEST {
                    Self::EchoRequest(EchoRequest::new(identifier, sequence_number, payload_data))
                } else {
                    Self::EchoReply(EchoReply::new(identifier, sequence_number, payload_data))
                })
            }
            kind::EXTERNAL_INTERFACE_DOWN => {
                if data.remaining() < 16 {
                    return Err(DecodeError::PacketEmptyOrTruncated);
                }
                Ok(Self::ExternalInterfaceDown(ExternalInterfaceDown {
                    isd_asn: IsdAsn(data.get_u64()),
                    interface: data.get_u64(),
                }))
            }
            kind::INTERNAL_CONNECTIVITY_DOWN => {
                if data.remaining() < 24 {
                    return Err(DecodeError::PacketEmptyOrTruncated);
                }
                Ok(Self::InternalConnectivityDown(InternalConnectivityDown {
                    isd_asn: IsdAsn(data.get_u64()),
                    ingress: data.get_u64(),
                    egress: data.get_u64(),
                }))
            }
            other => {
                Ok(Self::Other {
                    kind: other,
                    data: data.split_off(0),
                })
            }
        }
    }
}

impl WireEncode for Packet {
    fn encoded_length(&self) -> usize {
        8 + encoded_host_length(&self.source.host())
            + 8
            + encoded_host_length(&self.destination.host())
            + 3
            + self.path.raw().len()
            + self.payload.encoded_length()
    }

    fn encode_to<B: BufMut>(&self, buffer: &mut B) {
        encode_address(&self.source, buffer);
        encode_address(&self.destination, buffer);
        buffer.put_u8(self.path.path_type());
        buffer.put_u16(self.path.raw().len() as u16);
        buffer.put_slice(self.path.raw());
        self.payload.encode_to(buffer);
    }
}

impl WireDecode for Packet {
    type Error = DecodeError;

    fn decode(data: &mut Bytes) -> Result<Self, Self::Error> {
        let source = decode_address(data)?;
        let destination = decode_address(data)?;

        if data.remaining() < 3 {
            return Err(DecodeError::PacketEmptyOrTruncated);
        }
        let path_type = data.get_u8();
        let path_length = data.get_u16() as usize;
        if data.remaining() < path_length {
            return Err(DecodeError::PacketEmptyOrTruncated);
        }
        let path = DataPlanePath::decode_with_type(path_type, data.split_to(path_length))?;

        let payload = Payload::decode(data)?;
        Ok(Self {
            source,
            destination,
            path,
            payload,
        })
    }
}
