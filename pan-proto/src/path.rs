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

//! Forwarding path types.
//!
//! # Organisation
//!
//! - [`Path`] is the primary path type used with sockets and applications.
//!   It combines a [data plane path][DataPlanePath] with the endpoints it
//!   connects and the next hop on the network underlay, and it carries the
//!   lazily computed [`PathFingerprint`] of the route.
//!
//! - [`DataPlanePath`] represents the path header placed within a packet and
//!   sent on the network. Only the empty and the [standard][StandardPath]
//!   path types are interpreted; other types are carried opaquely.

use std::{
    fmt::{Display, Formatter},
    net,
    sync::OnceLock,
};

use bytes::Bytes;
use thiserror::Error;

use crate::{address::IsdAsn, packet::ByEndpoint};

pub mod standard;
pub use standard::{MetaHeader, StandardPath};

mod fingerprint;
pub use fingerprint::{FingerprintParseError, PathFingerprint};

/// Path types that may be encountered in a packet.
pub mod path_type {
    /// The empty path type.
    pub const EMPTY: u8 = 0;
    /// The standard hop-by-hop path type.
    pub const STANDARD: u8 = 1;
}

/// Errors raised when decoding a path header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathParseError {
    /// The provided bytes did not include the full path.
    #[error("the provided bytes did not include the full path")]
    EmptyOrTruncated,
    /// The meta header disagrees with itself or with the raw length.
    #[error("the path meta header is inconsistent")]
    InconsistentMeta,
}

/// Error returned when performing operations on a path of an unsupported
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported path type {0}")]
pub struct UnsupportedPathType(pub u8);

/// Data plane path found in a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPlanePath {
    /// The empty path type, used for intra-domain hops.
    EmptyPath,
    /// The standard hop-by-hop path header.
    Standard(StandardPath),
    /// The raw bytes of an unsupported path header type.
    Unsupported {
        /// The path's type.
        path_type: u8,
        /// The raw encoded path.
        bytes: Bytes,
    },
}

impl DataPlanePath {
    /// Returns the path's type.
    pub fn path_type(&self) -> u8 {
        match self {
            Self::EmptyPath => path_type::EMPTY,
            Self::Standard(_) => path_type::STANDARD,
            Self::Unsupported { path_type, .. } => *path_type,
        }
    }

    /// Returns true iff the path is a [`DataPlanePath::EmptyPath`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::EmptyPath)
    }

    /// Returns the raw binary of the path.
    pub fn raw(&self) -> &[u8] {
        match self {
            Self::EmptyPath => &[],
            Self::Standard(path) => path.raw(),
            Self::Unsupported { bytes, .. } => bytes,
        }
    }

    /// Decodes a data plane path of the given type from raw bytes.
    pub fn decode_with_type(path_type: u8, mut bytes: Bytes) -> Result<Self, PathParseError> {
        match path_type {
            path_type::EMPTY => {
                if bytes.is_empty() {
                    Ok(Self::EmptyPath)
                } else {
                    Err(PathParseError::InconsistentMeta)
                }
            }
            path_type::STANDARD => {
                let path = StandardPath::decode(&mut bytes)?;
                if !bytes.is_empty() {
                    return Err(PathParseError::InconsistentMeta);
                }
                Ok(Self::Standard(path))
            }
            other => {
                Ok(Self::Unsupported {
                    path_type: other,
                    bytes,
                })
            }
        }
    }

    /// Returns the fingerprint of the path.
    ///
    /// For repeated queries on the same path prefer [`Path::fingerprint`],
    /// which caches the digest.
    pub fn fingerprint(&self) -> PathFingerprint {
        PathFingerprint::of(self)
    }

    /// Reverses the path for use in the opposite direction.
    pub fn to_reversed(&self) -> Result<Self, UnsupportedPathType> {
        match self {
            Self::EmptyPath => Ok(Self::EmptyPath),
            Self::Standard(path) => Ok(Self::Standard(path.to_reversed())),
            Self::Unsupported { path_type, .. } => Err(UnsupportedPathType(*path_type)),
        }
    }
}

/// An end-to-end path between two routing domains.
#[derive(Debug, Clone)]
pub struct Path {
    /// The path header added to data plane packets.
    pub data_plane_path: DataPlanePath,
    /// The underlay address (IP + port) of the next hop, i.e. the local
    /// border router. None for intra-domain paths.
    pub underlay_next_hop: Option<net::SocketAddr>,
    /// The routing domains where the path starts and ends.
    pub isd_asn: ByEndpoint<IsdAsn>,
    /// Cache for the fingerprint, filled on first use.
    fingerprint: OnceLock<PathFingerprint>,
}

impl Path {
    /// Creates a new path with the provided data plane path, its endpoints,
    /// and the next hop in the network underlay.
    pub fn new(
        data_plane_path: DataPlanePath,
        isd_asn: ByEndpoint<IsdAsn>,
        underlay_next_hop: Option<net::SocketAddr>,
    ) -> Self {
        Self {
            data_plane_path,
            underlay_next_hop,
            isd_asn,
            fingerprint: OnceLock::new(),
        }
    }

    /// Returns a path for sending packets within the specified domain.
    ///
    /// # Panics
    ///
    /// Panics if the domain is a wildcard.
    pub fn local(isd_asn: IsdAsn) -> Self {
        assert!(!isd_asn.is_wildcard(), "no local path for wildcard domain");
        Self::new(
            DataPlanePath::EmptyPath,
            ByEndpoint::with_cloned(isd_asn),
            None,
        )
    }

    /// Creates a new empty path with the provided source and destination
    /// domains.
    pub fn empty(isd_asn: ByEndpoint<IsdAsn>) -> Self {
        Self::new(DataPlanePath::EmptyPath, isd_asn, None)
    }

    /// Returns the source of this path.
    pub const fn source(&self) -> IsdAsn {
        self.isd_asn.source
    }

    /// Returns the destination of this path.
    pub const fn destination(&self) -> IsdAsn {
        self.isd_asn.destination
    }

    /// Returns true iff the data plane path is an empty path.
    pub fn is_empty(&self) -> bool {
        self.data_plane_path.is_empty()
    }

    /// Returns the fingerprint of the path.
    ///
    /// The digest is computed on first use and cached, so this is cheap to
    /// call once per packet. See [`PathFingerprint`] for what it covers.
    pub fn fingerprint(&self) -> &PathFingerprint {
        self.fingerprint
            .get_or_init(|| PathFingerprint::of(&self.data_plane_path))
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        // The fingerprint cache is derived state and does not participate.
        self.data_plane_path == other.data_plane_path
            && self.underlay_next_hop == other.underlay_next_hop
            && self.isd_asn == other.isd_asn
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "src:{}, dst:{}, next hop: {}, fingerprint: {}",
            self.isd_asn.source,
            self.isd_asn.destination,
            self.underlay_next_hop
                .map_or_else(|| "none".to_string(), |a| a.to_string()),
            self.fingerprint().short(),
        )
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;

    fn standard_path() -> DataPlanePath {
        let mut raw = BytesMut::with_capacity(36);
        raw.put_u32(0x0000_2000);
        raw.put_slice(&[0u8; 32]);
        DataPlanePath::Standard(StandardPath::decode(&mut raw.freeze()).unwrap())
    }

    #[test]
    fn fingerprint_is_cached_and_stable() {
        let path = Path::new(
            standard_path(),
            ByEndpoint {
                source: "1-ff00:0:110".parse().unwrap(),
                destination: "1-ff00:0:112".parse().unwrap(),
            },
            None,
        );
        let first = *path.fingerprint();
        assert_eq!(*path.fingerprint(), first);
        assert_eq!(path.data_plane_path.fingerprint(), first);
    }

    #[test]
    fn local_path_is_empty() {
        let path = Path::local("1-ff00:0:110".parse().unwrap());
        assert!(path.is_empty());
        assert_eq!(path.source(), path.destination());
    }

    #[test]
    fn decode_with_type_round_trips() {
        let path = standard_path();
        let raw = Bytes::copy_from_slice(path.raw());
        assert_eq!(
            DataPlanePath::decode_with_type(path.path_type(), raw).unwrap(),
            path
        );

        assert_eq!(
            DataPlanePath::decode_with_type(path_type::EMPTY, Bytes::new()).unwrap(),
            DataPlanePath::EmptyPath
        );
        assert!(
            DataPlanePath::decode_with_type(path_type::EMPTY, Bytes::from_static(&[1])).is_err()
        );
    }
}
