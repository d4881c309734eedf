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

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// The kind of address that failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// An isolation-domain identifier.
    Isd,
    /// An AS number.
    Asn,
    /// A combined domain identifier such as `1-ff00:0:110`.
    IsdAsn,
    /// A structured endhost address such as `1-ff00:0:110,10.0.0.1`.
    Endhost,
    /// A structured socket address such as `1-ff00:0:110,10.0.0.1:443`.
    Socket,
}

impl Display for AddressKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Isd => "ISD",
            Self::Asn => "AS number",
            Self::IsdAsn => "ISD-AS number",
            Self::Endhost => "endhost address",
            Self::Socket => "socket address",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing any of the address types from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid {0} string")]
pub struct AddressParseError(pub AddressKind);

impl From<AddressKind> for AddressParseError {
    fn from(kind: AddressKind) -> Self {
        Self(kind)
    }
}
