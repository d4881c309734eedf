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

use super::{AddressParseError, error::AddressKind};

/// A 16-bit identifier of an isolation domain.
///
/// Isolation domains group ASes into independent routing planes; together
/// with an [`Asn`][super::Asn] this forms the domain identifier of an
/// endhost.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Isd(pub u16);

impl Isd {
    /// The ISD number representing the wildcard ISD.
    pub const WILDCARD: Self = Self(0);

    /// Maximum valid ISD identifier.
    pub const MAX: Self = Self::new(u16::MAX);

    /// The number of bits in an ISD number.
    pub const BITS: u32 = u16::BITS;

    /// Creates a new ISD from a 16-bit value.
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Return the identifier as a 16-bit value.
    pub const fn to_u16(&self) -> u16 {
        self.0
    }

    /// Return true for the special 'wildcard' ISD number.
    pub const fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD.0
    }
}

impl Display for Isd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Isd {
    type Err = AddressParseError;

    /// Parses an ISD from a decimal string.
    ///
    /// ISD 0 is parsed without any errors.
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        u16::from_str(string)
            .map(Isd::new)
            .or(Err(AddressKind::Isd.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_display() {
        assert_eq!(Isd::WILDCARD.to_string(), "0");
    }

    #[test]
    fn parses_decimal() {
        assert_eq!("19".parse::<Isd>(), Ok(Isd::new(19)));
        assert_eq!("65536".parse::<Isd>(), Err(AddressKind::Isd.into()));
        assert_eq!("1-ff00:0:110".parse::<Isd>(), Err(AddressKind::Isd.into()));
    }
}
