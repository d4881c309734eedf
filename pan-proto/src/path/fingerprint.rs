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

use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::DataPlanePath;

/// A canonical digest identifying the route described by a data plane path.
///
/// The digest covers the segment lengths and the ordered hop-field sequence
/// of a standard path. Info fields and reserved meta-header bits do not
/// contribute, so re-encodings that differ only there produce the same
/// fingerprint. Empty paths digest the empty sequence; unsupported path
/// types digest their type and raw bytes.
///
/// The canonical text form, used in access-control documents, is the
/// 64-character lowercase hex encoding of the digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathFingerprint([u8; 32]);

impl PathFingerprint {
    /// Computes the fingerprint of a data plane path.
    pub fn of(path: &DataPlanePath) -> Self {
        let mut hasher = Sha256::new();
        match path {
            DataPlanePath::EmptyPath => {}
            DataPlanePath::Standard(path) => {
                hasher.update(path.meta_header().segment_lengths);
                for hop_field in path.hop_fields() {
                    hasher.update(hop_field);
                }
            }
            DataPlanePath::Unsupported { path_type, bytes } => {
                hasher.update([*path_type]);
                hasher.update(bytes);
            }
        }
        Self(hasher.finalize().into())
    }

    /// Returns the raw digest.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns an abbreviated hex form for log output.
    pub fn short(&self) -> String {
        self.0[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl From<[u8; 32]> for PathFingerprint {
    fn from(digest: [u8; 32]) -> Self {
        Self(digest)
    }
}

impl Display for PathFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Debug for PathFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PathFingerprint({self})")
    }
}

/// Error returned when parsing a [`PathFingerprint`] from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid path fingerprint string")]
pub struct FingerprintParseError;

impl FromStr for PathFingerprint {
    type Err = FingerprintParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        if string.len() != 64 || !string.is_ascii() {
            return Err(FingerprintParseError);
        }
        let mut digest = [0u8; 32];
        for (byte, pair) in digest.iter_mut().zip(string.as_bytes().chunks_exact(2)) {
            let pair = std::str::from_utf8(pair).map_err(|_| FingerprintParseError)?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| FingerprintParseError)?;
        }
        Ok(Self(digest))
    }
}

impl Serialize for PathFingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PathFingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(serde::de::Error::custom)
    }
}
