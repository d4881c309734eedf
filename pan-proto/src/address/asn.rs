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

/// A 48-bit identifier of an autonomous system.
///
/// AS numbers in the BGP range (below 2^32) are written in decimal, larger
/// values as three colon-separated groups of 16 bits in hexadecimal, e.g.
/// `ff00:0:110`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Asn(u64);

impl Asn {
    /// The AS number representing the wildcard AS.
    pub const WILDCARD: Self = Self(0);

    /// The number of bits in an AS number.
    pub const BITS: u32 = 48;

    /// Maximum valid AS number.
    pub const MAX: Self = Self((1 << Self::BITS) - 1);

    /// Largest AS number that is formatted in decimal.
    const MAX_DECIMAL: u64 = u32::MAX as u64;

    const GROUP_BITS: u32 = 16;
    const GROUP_MASK: u64 = (1 << Self::GROUP_BITS) - 1;

    /// Creates a new AS number from a 64-bit value.
    ///
    /// # Panics
    ///
    /// Panics if the provided value is larger than [`Asn::MAX`].
    pub const fn new(id: u64) -> Self {
        assert!(id <= Self::MAX.0, "AS number out of range");
        Self(id)
    }

    /// Return the AS number as a 64-bit value.
    pub const fn to_u64(&self) -> u64 {
        self.0
    }

    /// Return true for the special 'wildcard' AS number.
    pub const fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD.0
    }
}

impl Display for Asn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0 <= Self::MAX_DECIMAL {
            write!(f, "{}", self.0)
        } else {
            write!(
                f,
                "{:x}:{:x}:{:x}",
                (self.0 >> (2 * Self::GROUP_BITS)) & Self::GROUP_MASK,
                (self.0 >> Self::GROUP_BITS) & Self::GROUP_MASK,
                self.0 & Self::GROUP_MASK,
            )
        }
    }
}

impl FromStr for Asn {
    type Err = AddressParseError;

    /// Parses an AS number from its canonical text form.
    ///
    /// Accepts both the decimal BGP form and the colon-separated hexadecimal
    /// form; AS 0 is parsed without any errors.
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        if string.contains(':') {
            let mut value = 0u64;
            let mut groups = 0usize;
            for group in string.split(':') {
                let group =
                    u64::from_str_radix(group, 16).or(Err(AddressParseError(AddressKind::Asn)))?;
                if group > Self::GROUP_MASK {
                    return Err(AddressKind::Asn.into());
                }
                value = (value << Self::GROUP_BITS) | group;
                groups += 1;
            }
            if groups != 3 {
                return Err(AddressKind::Asn.into());
            }
            Ok(Self(value))
        } else {
            let value = u64::from_str(string).or(Err(AddressParseError(AddressKind::Asn)))?;
            if value > Self::MAX_DECIMAL {
                return Err(AddressKind::Asn.into());
            }
            Ok(Self(value))
        }
    }
}
