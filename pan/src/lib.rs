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

//! Path-aware transport layer.
//!
//! This crate lets ordinary protocols run over a multi-path internetwork
//! while giving applications control over the forwarding paths in use:
//!
//! - [`acl`] and [`filter`] restrict, per source domain, which paths may
//!   deliver inbound packets;
//! - [`endpoint`] defines the packet endpoint boundary towards the
//!   underlying network stack, with a UDP-backed implementation in [`udp`];
//! - [`mangle`] embeds structured addresses in standard URL host syntax;
//! - [`resolve`] and [`dial`] turn symbolic or structured addresses into
//!   live connections for HTTP-style transports;
//! - [`quic`] provides path-aware QUIC endpoints subject to packet
//!   filtering;
//! - [`ping`] probes reachability and path health over a chosen path.

pub mod acl;
pub mod dial;
pub mod endpoint;
pub mod filter;
pub mod mangle;
pub mod ping;
pub mod quic;
pub mod resolve;
pub mod testing;
pub mod udp;

pub use acl::{AccessControlList, AclError};
pub use filter::PacketFilter;
