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

//! Path-level access-control lists.
//!
//! An access-control list maps source routing domains to the set of path
//! fingerprints that may deliver their packets. The persisted form is a JSON
//! document keyed by the canonical domain text:
//!
//! ```json
//! {
//!     "1-ff00:0:110": [
//!         "6ba1…<64 hex chars>",
//!         "f3c2…<64 hex chars>"
//!     ]
//! }
//! ```
//!
//! Lists are loaded once at startup and read-only afterwards; a malformed
//! document is a hard error so the process refuses to start serving with a
//! policy it cannot honor.

use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::Path,
};

use pan_proto::{address::IsdAsn, path::PathFingerprint};
use thiserror::Error;

/// Errors raised when loading an access-control list.
#[derive(Debug, Error)]
pub enum AclError {
    /// The document could not be read.
    #[error("reading ACL file: {0}")]
    Io(#[from] io::Error),
    /// The document is not a valid ACL, including malformed domain keys and
    /// fingerprint strings.
    #[error("parsing ACL document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Per-domain allow-sets of path fingerprints.
///
/// A listed domain accepts exactly its listed fingerprints; a domain without
/// an entry is denied. "No restriction at all" is represented by the absence
/// of an `AccessControlList` (see [`PacketFilter`][crate::filter::PacketFilter]),
/// not by an empty list.
#[derive(Debug, Clone, Default)]
pub struct AccessControlList {
    allowed: HashMap<IsdAsn, HashSet<PathFingerprint>>,
}

impl AccessControlList {
    /// Parses an access-control list from its JSON document form.
    pub fn from_json_str(document: &str) -> Result<Self, AclError> {
        let entries: HashMap<IsdAsn, Vec<PathFingerprint>> = serde_json::from_str(document)?;
        Ok(entries.into_iter().collect())
    }

    /// Loads an access-control list from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AclError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Returns true iff packets from `source` may arrive over the path with
    /// the given fingerprint.
    ///
    /// This is a set lookup; it never blocks and runs on the per-packet
    /// receive path.
    pub fn allows(&self, source: IsdAsn, fingerprint: &PathFingerprint) -> bool {
        self.allowed
            .get(&source)
            .is_some_and(|allowed| allowed.contains(fingerprint))
    }

    /// Returns the number of domains with an entry.
    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    /// Returns true iff no domain has an entry.
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

impl<F: IntoIterator<Item = PathFingerprint>> FromIterator<(IsdAsn, F)> for AccessControlList {
    fn from_iter<T: IntoIterator<Item = (IsdAsn, F)>>(entries: T) -> Self {
        Self {
            allowed: entries
                .into_iter()
                .map(|(domain, fingerprints)| (domain, fingerprints.into_iter().collect()))
                .collect(),
        }
    }
}
