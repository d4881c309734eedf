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

//! Addresses for routing domains and endhosts.
//!
//! # Organisation
//!
//! - An [`IsdAsn`] globally identifies a routing domain, and consists of an
//!   isolation-domain identifier ([`Isd`]) and an AS number ([`Asn`]).
//! - An [`EndhostAddr`] combines an [`IsdAsn`] with the endhost's AS-local IP
//!   address; this is the structured address carried in packets.
//! - A [`SocketAddr`] is an [`EndhostAddr`] with an associated port, used for
//!   application addressing. Its canonical text form `ia,host:port` (with the
//!   host bracketed iff IPv6) is the form consumed by the dial boundary.

mod asn;
pub use asn::Asn;

mod isd;
pub use isd::Isd;

mod ia;
pub use ia::IsdAsn;

mod endhost;
pub use endhost::EndhostAddr;

mod socket_address;
pub use socket_address::SocketAddr;

mod error;
pub use error::{AddressKind, AddressParseError};
