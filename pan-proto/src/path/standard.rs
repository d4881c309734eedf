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

//! The standard hop-by-hop path header.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::PathParseError;

/// Meta information at the start of a standard path header.
///
/// The header packs, into 32 bits, an index to the current info field, an
/// index to the current hop field, 6 reserved bits, and the three 6-bit
/// segment lengths.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetaHeader {
    /// An index to the current info field for the packet on its way through
    /// the network.
    pub current_info_field: u8,
    /// An index to the current hop field within the segment pointed to by the
    /// info field.
    pub current_hop_field: u8,
    /// The number of hop fields in each segment.
    ///
    /// For valid paths, the lengths at indices 1 and 2 are non-zero only if
    /// all preceding lengths are non-zero.
    pub segment_lengths: [u8; 3],
}

impl MetaHeader {
    /// The length of the path meta header in bytes.
    pub const LENGTH: usize = 4;
    /// The length of an info field in bytes.
    pub const INFO_FIELD_LENGTH: usize = 8;
    /// The length of a hop field in bytes.
    pub const HOP_FIELD_LENGTH: usize = 12;

    const SEGMENT_LEN_BITS: u32 = 6;
    const SEGMENT_LEN_MASK: u32 = (1 << Self::SEGMENT_LEN_BITS) - 1;

    /// The number of info fields.
    pub const fn info_fields_count(&self) -> usize {
        match &self.segment_lengths {
            [0, ..] => 0,
            [_, 0, _] => 1,
            [.., 0] => 2,
            _ => 3,
        }
    }

    /// The number of hop fields.
    pub const fn hop_fields_count(&self) -> usize {
        self.segment_lengths[0] as usize
            + self.segment_lengths[1] as usize
            + self.segment_lengths[2] as usize
    }

    /// Unpacks the meta header from its 32-bit encoding, ignoring the
    /// reserved bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            current_info_field: (bits >> 30) as u8,
            current_hop_field: ((bits >> 24) & Self::SEGMENT_LEN_MASK) as u8,
            segment_lengths: [
                ((bits >> 12) & Self::SEGMENT_LEN_MASK) as u8,
                ((bits >> 6) & Self::SEGMENT_LEN_MASK) as u8,
                (bits & Self::SEGMENT_LEN_MASK) as u8,
            ],
        }
    }

    /// Packs the meta header into its 32-bit encoding with zeroed reserved
    /// bits.
    pub const fn to_bits(&self) -> u32 {
        ((self.current_info_field as u32) << 30)
            | ((self.current_hop_field as u32 & Self::SEGMENT_LEN_MASK) << 24)
            | ((self.segment_lengths[0] as u32) << 12)
            | ((self.segment_lengths[1] as u32) << 6)
            | (self.segment_lengths[2] as u32)
    }

    /// The total length in bytes of a path carrying this meta header.
    pub const fn encoded_path_length(&self) -> usize {
        Self::LENGTH
            + self.info_fields_count() * Self::INFO_FIELD_LENGTH
            + self.hop_fields_count() * Self::HOP_FIELD_LENGTH
    }
}

/// A standard path header, backed by its raw encoding.
///
/// The raw bytes are validated against the meta header on decode; the
/// contained hop-field sequence is what gives the path its
/// [fingerprint][super::PathFingerprint] identity.
#[derive(Debug, Clone)]
pub struct StandardPath {
    raw: Bytes,
    meta: MetaHeader,
}

impl StandardPath {
    /// Decodes a standard path from the front of the buffer.
    pub fn decode(data: &mut Bytes) -> Result<Self, PathParseError> {
        if data.remaining() < MetaHeader::LENGTH {
            return Err(PathParseError::EmptyOrTruncated);
        }
        let mut header = &data.as_ref()[..MetaHeader::LENGTH];
        let meta = MetaHeader::from_bits(header.get_u32());

        if meta.hop_fields_count() == 0
            || meta.info_fields_count() == 0
            || (meta.current_info_field as usize) >= meta.info_fields_count()
            || (meta.current_hop_field as usize) >= meta.hop_fields_count()
        {
            return Err(PathParseError::InconsistentMeta);
        }
        // Segments must be filled in order.
        if meta.segment_lengths[0] == 0
            && (meta.segment_lengths[1] != 0 || meta.segment_lengths[2] != 0)
            || meta.segment_lengths[1] == 0 && meta.segment_lengths[2] != 0
        {
            return Err(PathParseError::InconsistentMeta);
        }

        let length = meta.encoded_path_length();
        if data.remaining() < length {
            return Err(PathParseError::EmptyOrTruncated);
        }
        Ok(Self {
            raw: data.split_to(length),
            meta,
        })
    }

    /// Builds a path from a meta header with zeroed info and hop fields.
    ///
    /// The meta header must describe at least one segment and one hop field.
    pub fn zeroed(meta: MetaHeader) -> Result<Self, PathParseError> {
        let mut raw = BytesMut::with_capacity(meta.encoded_path_length());
        raw.put_u32(meta.to_bits());
        raw.put_bytes(0, meta.encoded_path_length() - MetaHeader::LENGTH);
        Self::decode(&mut raw.freeze())
    }

    /// Returns the raw binary of the path.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Returns the meta header.
    pub const fn meta_header(&self) -> &MetaHeader {
        &self.meta
    }

    /// Returns the hop fields of the path in order, each
    /// [`MetaHeader::HOP_FIELD_LENGTH`] bytes.
    pub fn hop_fields(&self) -> impl Iterator<Item = &[u8]> {
        let offset =
            MetaHeader::LENGTH + self.meta.info_fields_count() * MetaHeader::INFO_FIELD_LENGTH;
        self.raw[offset..].chunks_exact(MetaHeader::HOP_FIELD_LENGTH)
    }

    /// Returns the info fields of the path in order, each
    /// [`MetaHeader::INFO_FIELD_LENGTH`] bytes.
    pub fn info_fields(&self) -> impl Iterator<Item = &[u8]> {
        let end =
            MetaHeader::LENGTH + self.meta.info_fields_count() * MetaHeader::INFO_FIELD_LENGTH;
        self.raw[MetaHeader::LENGTH..end].chunks_exact(MetaHeader::INFO_FIELD_LENGTH)
    }

    /// Returns the path reversed for use in the opposite direction.
    ///
    /// Segments and hop fields are reversed, the construction-direction flag
    /// of every info field is flipped, and the current indices are reset so
    /// the path is usable from an endhost.
    pub fn to_reversed(&self) -> Self {
        let mut segment_lengths = [0u8; 3];
        let segments = self.meta.info_fields_count();
        for (reversed, length) in segment_lengths[..segments]
            .iter_mut()
            .zip(self.meta.segment_lengths[..segments].iter().rev())
        {
            *reversed = *length;
        }
        let meta = MetaHeader {
            current_info_field: 0,
            current_hop_field: 0,
            segment_lengths,
        };

        let mut raw = BytesMut::with_capacity(self.raw.len());
        raw.put_u32(meta.to_bits());
        for info_field in self.info_fields().collect::<Vec<_>>().into_iter().rev() {
            raw.put_u8(info_field[0] ^ INFO_FIELD_FLAG_CONS_DIR);
            raw.put_slice(&info_field[1..]);
        }
        for hop_field in self.hop_fields().collect::<Vec<_>>().into_iter().rev() {
            raw.put_slice(hop_field);
        }

        Self {
            raw: raw.freeze(),
            meta,
        }
    }
}

/// The construction-direction flag in an info field's flags byte.
const INFO_FIELD_FLAG_CONS_DIR: u8 = 0x1;

impl PartialEq for StandardPath {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for StandardPath {}
