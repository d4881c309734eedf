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

//! Protocol-level types for endhosts in a path-aware internetwork.
//!
//! In the underlying network, endhosts reside in routing domains that are
//! identified by a two-level numeric identifier, and every packet carries an
//! explicit forwarding path selected by the sending application.
//!
//! This crate provides the core types used by such endhosts:
//!
//! - [addresses][address] which identify routing domains and endhosts;
//! - [paths][path] which describe the route taken by packets through the
//!   network, and canonical [fingerprints][path::PathFingerprint] which give
//!   paths a comparable identity;
//! - [packets][packet] as exchanged with a packet endpoint, including the
//!   echo and link-state notification payloads used for diagnostics.
//!
//! This crate does not perform any I/O. See the **pan** crate for socket
//! implementations, path-level access control, and the echo prober built on
//! these types.

pub mod address;
pub mod packet;
pub mod path;
pub mod wire_encoding;
