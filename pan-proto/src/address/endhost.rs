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
    net::IpAddr,
    str::FromStr,
};

use super::{AddressParseError, IsdAsn, error::AddressKind};

/// A structured endhost address: a routing-domain identifier together with
/// the endhost's AS-local IP address.
///
/// The canonical text form is `ia,host` with the host written without
/// brackets, e.g. `1-ff00:0:110,::1`. Parsing additionally accepts a
/// bracketed IPv6 host, `1-ff00:0:110,[::1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndhostAddr {
    isd_asn: IsdAsn,
    host: IpAddr,
}

impl EndhostAddr {
    /// Creates a new endhost address.
    pub const fn new(isd_asn: IsdAsn, host: IpAddr) -> Self {
        Self { isd_asn, host }
    }

    /// Returns the routing-domain identifier.
    pub const fn isd_asn(&self) -> IsdAsn {
        self.isd_asn
    }

    /// Returns the AS-local host address.
    pub const fn host(&self) -> IpAddr {
        self.host
    }
}

impl Display for EndhostAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.isd_asn, self.host)
    }
}

impl FromStr for EndhostAddr {
    type Err = AddressParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let (ia, host) = string
            .split_once(',')
            .ok_or(AddressParseError(AddressKind::Endhost))?;
        let isd_asn: IsdAsn = ia.parse().map_err(|_| AddressKind::Endhost)?;

        let host = match host.strip_prefix('[') {
            Some(inner) => inner
                .strip_suffix(']')
                .ok_or(AddressParseError(AddressKind::Endhost))?,
            None => host,
        };
        let host = IpAddr::from_str(host).or(Err(AddressParseError(AddressKind::Endhost)))?;

        Ok(Self { isd_asn, host })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_and_ipv6_hosts() {
        let v4: EndhostAddr = "1-ff00:0:110,127.0.0.1".parse().unwrap();
        assert_eq!(v4.to_string(), "1-ff00:0:110,127.0.0.1");

        let v6: EndhostAddr = "1-ff00:0:110,::1".parse().unwrap();
        let bracketed: EndhostAddr = "1-ff00:0:110,[::1]".parse().unwrap();
        assert_eq!(v6, bracketed);
        // The canonical form never brackets the host.
        assert_eq!(v6.to_string(), "1-ff00:0:110,::1");
    }

    #[test]
    fn rejects_malformed() {
        for text in [
            "",
            "foo",
            "1-ff00:0:110",
            "1-ff00:0:110,",
            "1-ff00:0:110,[::1",
            "1-ff00:0:110,host",
            "1-ff00:0:110,127.0.0.1:80",
        ] {
            assert!(text.parse::<EndhostAddr>().is_err(), "accepted {text:?}");
        }
    }
}
