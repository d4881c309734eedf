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

//! Per-packet path filtering.

use pan_proto::{packet::Packet, path::PathFingerprint};

use crate::acl::AccessControlList;

/// Decides, per inbound packet, whether the path it arrived over is
/// acceptable for its source domain.
///
/// Without an access-control list every packet is accepted; the one-time
/// warning about running unrestricted is the owning component's to log. With
/// a list, a packet is accepted iff its source domain lists the fingerprint
/// of the traversed path; domains without an entry are denied.
#[derive(Debug, Clone, Default)]
pub struct PacketFilter {
    acl: Option<AccessControlList>,
}

impl PacketFilter {
    /// Creates a filter enforcing the given list, or an accept-all filter
    /// for `None`.
    pub fn new(acl: Option<AccessControlList>) -> Self {
        Self { acl }
    }

    /// Returns true iff an access-control list is configured.
    pub const fn is_enforcing(&self) -> bool {
        self.acl.is_some()
    }

    /// Returns true iff the packet may be accepted.
    ///
    /// `fingerprint` is the fingerprint of the path the packet arrived over.
    /// The check is a hash lookup; it performs no I/O and never blocks, and
    /// is safe to call concurrently from multiple receive paths.
    pub fn filter_packet(&self, packet: &Packet, fingerprint: &PathFingerprint) -> bool {
        match &self.acl {
            None => true,
            Some(acl) => acl.allows(packet.source.isd_asn(), fingerprint),
        }
    }
}

#[cfg(test)]
mod tests {
    use pan_proto::{
        address::EndhostAddr,
        packet::{EchoRequest, Payload},
        path::DataPlanePath,
    };

    use super::*;

    fn packet_from(source: &str) -> Packet {
        Packet {
            source: source.parse().unwrap(),
            destination: "1-ff00:0:111,10.0.0.1".parse::<EndhostAddr>().unwrap(),
            path: DataPlanePath::EmptyPath,
            payload: Payload::EchoRequest(EchoRequest::new(0, 0, bytes::Bytes::new())),
        }
    }

    #[test]
    fn no_acl_accepts_everything() {
        let filter = PacketFilter::default();
        assert!(!filter.is_enforcing());
        for source in ["1-ff00:0:110", "42-1", "0-0"] {
            let packet = packet_from(&format!("{source},127.0.0.1"));
            assert!(filter.filter_packet(&packet, &PathFingerprint::from([9; 32])));
        }
    }

    #[test]
    fn acl_restricts_to_listed_fingerprints() {
        let fp1 = PathFingerprint::from([1; 32]);
        let fp2 = PathFingerprint::from([2; 32]);
        let fp3 = PathFingerprint::from([3; 32]);
        let acl: AccessControlList = [("1-ff00:0:110".parse().unwrap(), vec![fp1, fp2])]
            .into_iter()
            .collect();
        let filter = PacketFilter::new(Some(acl));

        let from_listed = packet_from("1-ff00:0:110,127.0.0.1");
        assert!(filter.filter_packet(&from_listed, &fp1));
        assert!(filter.filter_packet(&from_listed, &fp2));
        assert!(!filter.filter_packet(&from_listed, &fp3));

        // Default-deny for domains without an entry.
        let from_absent = packet_from("1-ff00:0:999,127.0.0.1");
        assert!(!filter.filter_packet(&from_absent, &fp1));
    }
}
