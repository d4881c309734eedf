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

//! Traits for encoding and decoding values to and from buffers.

use bytes::{BufMut, Bytes, BytesMut};

/// A value that can be encoded to a buffer.
pub trait WireEncode {
    /// The length of the encoded value in bytes.
    fn encoded_length(&self) -> usize;

    /// Encodes the value to the provided buffer.
    fn encode_to<B: BufMut>(&self, buffer: &mut B);

    /// Encodes the value to a freshly allocated buffer.
    fn encode_to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.encoded_length());
        self.encode_to(&mut buffer);
        buffer.freeze()
    }
}

/// A value that can be decoded from a [`Bytes`] buffer.
///
/// Decoding advances the buffer past the consumed bytes.
pub trait WireDecode: Sized {
    /// The error returned on malformed input.
    type Error;

    /// Decodes a value from the front of the buffer.
    fn decode(data: &mut Bytes) -> Result<Self, Self::Error>;
}
