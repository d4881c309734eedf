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
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use super::{AddressParseError, Asn, Isd, error::AddressKind};

/// The combined identifier of a routing domain: isolation domain plus AS
/// number, packed into 64 bits.
///
/// The canonical text form is `<isd>-<as>`, e.g. `1-ff00:0:110`; this is
/// also the form used as map key in access-control documents, so the serde
/// implementations go through the text form rather than the integer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct IsdAsn(pub u64);

impl IsdAsn {
    /// The wildcard domain identifier.
    pub const WILDCARD: Self = Self(0);

    /// Creates a new identifier from its ISD and AS components.
    pub const fn new(isd: Isd, asn: Asn) -> Self {
        Self(((isd.to_u16() as u64) << Asn::BITS) | asn.to_u64())
    }

    /// Returns the isolation-domain component.
    pub const fn isd(&self) -> Isd {
        Isd::new((self.0 >> Asn::BITS) as u16)
    }

    /// Returns the AS-number component.
    pub const fn asn(&self) -> Asn {
        Asn::new(self.0 & Asn::MAX.to_u64())
    }

    /// Return the identifier as a 64-bit value.
    pub const fn to_u64(&self) -> u64 {
        self.0
    }

    /// Returns true if either the ISD or the AS component is a wildcard.
    pub const fn is_wildcard(&self) -> bool {
        self.isd().is_wildcard() || self.asn().is_wildcard()
    }
}

impl Display for IsdAsn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.isd(), self.asn())
    }
}

impl FromStr for IsdAsn {
    type Err = AddressParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let (isd, asn) = string
            .split_once('-')
            .ok_or(AddressParseError(AddressKind::IsdAsn))?;
        Ok(Self::new(isd.parse()?, asn.parse()?))
    }
}

impl Serialize for IsdAsn {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IsdAsn {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_text() {
        for text in ["1-ff00:0:110", "65535-ffff:ffff:ffff", "0-0", "19-65000"] {
            let ia: IsdAsn = text.parse().unwrap();
            assert_eq!(ia.to_string(), text);
        }
    }

    #[test]
    fn splits_at_first_dash() {
        let ia: IsdAsn = "1-ff00:0:110".parse().unwrap();
        assert_eq!(ia.isd(), Isd::new(1));
        assert_eq!(ia.asn(), Asn::new(0xff00_0000_0110));
    }

    #[test]
    fn wildcard_components() {
        assert!(IsdAsn::WILDCARD.is_wildcard());
        assert!("0-ff00:0:110".parse::<IsdAsn>().unwrap().is_wildcard());
        assert!("1-0".parse::<IsdAsn>().unwrap().is_wildcard());
        assert!(!"1-ff00:0:110".parse::<IsdAsn>().unwrap().is_wildcard());
    }

    #[test]
    fn rejects_malformed() {
        for text in ["", "1", "1-", "-1", "1-2-3", "x-ff00:0:110"] {
            assert!(text.parse::<IsdAsn>().is_err(), "accepted {text:?}");
        }
    }

    #[test]
    fn serde_uses_text_form() {
        let ia: IsdAsn = "1-ff00:0:110".parse().unwrap();
        let json = serde_json::to_string(&ia).unwrap();
        assert_eq!(json, "\"1-ff00:0:110\"");
        assert_eq!(serde_json::from_str::<IsdAsn>(&json).unwrap(), ia);
    }
}
