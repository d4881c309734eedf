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
    fmt::{Display, Formatter},
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use super::{AddressParseError, EndhostAddr, IsdAsn, error::AddressKind};

/// An [`EndhostAddr`] with an associated port.
///
/// The canonical text form is `ia,host:port`, with the host bracketed iff it
/// is an IPv6 address: `1-ff00:0:110,127.0.0.1:443` and
/// `1-ff00:0:110,[::1]:443`. This is the resolved address form handed to the
/// dial boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketAddr {
    addr: EndhostAddr,
    port: u16,
}

impl SocketAddr {
    /// Creates a new socket address.
    pub const fn new(addr: EndhostAddr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Returns the endhost address without the port.
    pub const fn endhost_addr(&self) -> EndhostAddr {
        self.addr
    }

    /// Returns the routing-domain identifier.
    pub const fn isd_asn(&self) -> IsdAsn {
        self.addr.isd_asn()
    }

    /// Returns the AS-local host address.
    pub const fn host(&self) -> IpAddr {
        self.addr.host()
    }

    /// Returns the port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the same address with the port replaced.
    pub const fn with_port(&self, port: u16) -> Self {
        Self::new(self.addr, port)
    }
}

impl Display for SocketAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.addr.host() {
            IpAddr::V4(host) => write!(f, "{},{}:{}", self.addr.isd_asn(), host, self.port),
            IpAddr::V6(host) => write!(f, "{},[{}]:{}", self.addr.isd_asn(), host, self.port),
        }
    }
}

impl FromStr for SocketAddr {
    type Err = AddressParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        const ERR: AddressParseError = AddressParseError(AddressKind::Socket);

        let (ia, rest) = string.split_once(',').ok_or(ERR)?;
        let isd_asn: IsdAsn = ia.parse().or(Err(ERR))?;

        let (host, port) = if let Some(inner) = rest.strip_prefix('[') {
            // Bracketed IPv6 host followed by the port.
            let (host, port) = inner.split_once("]:").ok_or(ERR)?;
            let host = Ipv6Addr::from_str(host).or(Err(ERR))?;
            (IpAddr::V6(host), port)
        } else {
            // Without brackets only an IPv4 host is unambiguous.
            let (host, port) = rest.rsplit_once(':').ok_or(ERR)?;
            let host = Ipv4Addr::from_str(host).or(Err(ERR))?;
            (IpAddr::V4(host), port)
        };
        let port = u16::from_str(port).or(Err(ERR))?;

        Ok(Self::new(EndhostAddr::new(isd_asn, host), port))
    }
}

impl From<(EndhostAddr, u16)> for SocketAddr {
    fn from((addr, port): (EndhostAddr, u16)) -> Self {
        Self::new(addr, port)
    }
}
