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

//! End-to-end tests for the echo prober over an in-memory endpoint pair.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ntest::timeout;
use pan::{
    endpoint::PacketConn,
    ping::{Pinger, ProbeSendError, Reply, ReplyError},
    testing,
};
use pan_proto::{
    address::SocketAddr,
    packet::{EchoReply, ExternalInterfaceDown, Packet, Payload},
    path::{DataPlanePath, MetaHeader, Path, StandardPath},
};
use tokio::sync::mpsc;

fn addr(text: &str) -> SocketAddr {
    text.parse().unwrap()
}

/// A forwarding path between the test domains with a (synthetic) next hop.
fn cross_domain_path(source: &str, destination: &str) -> Path {
    let meta = MetaHeader {
        segment_lengths: [2, 0, 0],
        ..Default::default()
    };
    Path::new(
        DataPlanePath::Standard(StandardPath::zeroed(meta).unwrap()),
        pan_proto::packet::ByEndpoint {
            source: source.parse().unwrap(),
            destination: destination.parse().unwrap(),
        },
        Some("127.0.0.1:30041".parse().unwrap()),
    )
}

fn spawn_pinger(
    conn: Arc<dyn PacketConn>,
) -> (Arc<Pinger>, mpsc::Receiver<Reply>, tokio::task::JoinHandle<()>) {
    let (pinger, replies) = Pinger::new(conn);
    let pinger = Arc::new(pinger);
    let drain = tokio::spawn({
        let pinger = pinger.clone();
        async move { pinger.drain().await }
    });
    (pinger, replies, drain)
}

/// Echoes every probe request back to the prober, as the remote stack would.
fn spawn_responder(conn: Arc<dyn PacketConn>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok((packet, from)) = conn.read_from().await {
            let Payload::EchoRequest(request) = packet.payload else {
                continue;
            };
            let reply = Packet {
                source: conn.local_addr().endhost_addr(),
                destination: packet.source,
                path: packet.path,
                payload: Payload::EchoReply(EchoReply::new(
                    request.identifier,
                    request.sequence_number,
                    request.data,
                )),
            };
            if conn.write_to(reply, from).await.is_err() {
                return;
            }
        }
    })
}

#[tokio::test]
#[timeout(10_000)]
async fn delivers_replies_with_rtt() {
    let prober_addr = addr("1-ff00:0:110,127.0.0.1:40001");
    let remote_addr = addr("1-ff00:0:112,127.0.0.2:40002");
    let (prober_conn, remote_conn) = testing::conn_pair(prober_addr, remote_addr);

    let (pinger, mut replies, drain) = spawn_pinger(prober_conn);
    let responder = spawn_responder(remote_conn.clone());

    let path = cross_domain_path("1-ff00:0:110", "1-ff00:0:112");
    for sequence in 0..3u16 {
        pinger
            .send(remote_addr.endhost_addr(), &path, sequence, 16)
            .await
            .unwrap();
    }

    for expected_sequence in 0..3u16 {
        let reply = replies.recv().await.expect("reply expected");
        let echo = reply.reply.as_ref().expect("successful echo expected");
        assert_eq!(echo.sequence_number, expected_sequence);
        assert_eq!(echo.identifier, pinger.identifier());
        assert_eq!(reply.source, remote_addr.endhost_addr());
        assert_eq!(echo.data.len(), 16);
        assert!(reply.size > 0);

        let rtt = reply.rtt().expect("rtt expected");
        assert!(rtt >= chrono::TimeDelta::zero(), "rtt {rtt} negative");
    }

    pinger.close();
    remote_conn.close();
    drain.await.unwrap();
    responder.await.unwrap();
}

#[tokio::test]
#[timeout(10_000)]
async fn filters_replies_for_other_probers() {
    let prober_addr = addr("1-ff00:0:110,127.0.0.1:40001");
    let remote_addr = addr("1-ff00:0:112,127.0.0.2:40002");
    let (prober_conn, remote_conn) = testing::conn_pair(prober_addr, remote_addr);

    let (pinger, mut replies, drain) = spawn_pinger(prober_conn);
    let mismatches = Arc::new(AtomicUsize::new(0));
    pinger.set_error_handler(Box::new({
        let mismatches = mismatches.clone();
        move |_error| {
            mismatches.fetch_add(1, Ordering::SeqCst);
        }
    }));

    // A reply for some unrelated prober sharing the stack, then ours.
    let underlay = "127.0.0.1:40002".parse().unwrap();
    for (identifier, sequence) in [(pinger.identifier().wrapping_add(1), 7u16), (pinger.identifier(), 8u16)] {
        let reply = Packet {
            source: remote_addr.endhost_addr(),
            destination: prober_addr.endhost_addr(),
            path: DataPlanePath::EmptyPath,
            payload: Payload::EchoReply(EchoReply::new(
                identifier,
                sequence,
                bytes::Bytes::from_static(&[0u8; 8]),
            )),
        };
        remote_conn.write_to(reply, underlay).await.unwrap();
    }

    // Only the matching reply is delivered.
    let reply = replies.recv().await.expect("reply expected");
    assert_eq!(reply.reply.unwrap().sequence_number, 8);
    assert_eq!(mismatches.load(Ordering::SeqCst), 1);

    pinger.close();
    drain.await.unwrap();
}

#[tokio::test]
#[timeout(10_000)]
async fn link_state_notifications_become_typed_errors() {
    let prober_addr = addr("1-ff00:0:110,127.0.0.1:40001");
    let remote_addr = addr("1-ff00:0:112,127.0.0.2:40002");
    let (prober_conn, remote_conn) = testing::conn_pair(prober_addr, remote_addr);

    let (pinger, mut replies, drain) = spawn_pinger(prober_conn);

    let notification = Packet {
        source: remote_addr.endhost_addr(),
        destination: prober_addr.endhost_addr(),
        path: DataPlanePath::EmptyPath,
        payload: Payload::ExternalInterfaceDown(ExternalInterfaceDown {
            isd_asn: "1-ff00:0:112".parse().unwrap(),
            interface: 5,
        }),
    };
    remote_conn
        .write_to(notification, "127.0.0.1:40002".parse().unwrap())
        .await
        .unwrap();

    let reply = replies.recv().await.expect("reply expected");
    match reply.reply {
        Err(ReplyError::ExternalInterfaceDown {
            isd_asn, interface, ..
        }) => {
            assert_eq!(isd_asn, "1-ff00:0:112".parse().unwrap());
            assert_eq!(interface, 5);
        }
        other => panic!("expected external interface down, got {other:?}"),
    }
    assert_eq!(reply.rtt(), None);

    pinger.close();
    drain.await.unwrap();
}

#[tokio::test]
#[timeout(10_000)]
async fn empty_path_to_foreign_domain_fails() {
    let prober_addr = addr("1-ff00:0:110,127.0.0.1:40001");
    let remote_addr = addr("1-ff00:0:112,127.0.0.2:40002");
    let (prober_conn, _remote_conn) = testing::conn_pair(prober_addr, remote_addr);

    let (pinger, _replies) = Pinger::new(prober_conn);
    let local_path = Path::local("1-ff00:0:110".parse().unwrap());

    let error = pinger
        .send(remote_addr.endhost_addr(), &local_path, 0, 8)
        .await
        .unwrap_err();
    assert!(matches!(error, ProbeSendError::NoPath { .. }));
}

#[tokio::test]
#[timeout(10_000)]
async fn empty_path_within_domain_uses_endhost_port() {
    let prober_addr = addr("1-ff00:0:110,127.0.0.1:40001");
    let neighbor_addr = addr("1-ff00:0:110,127.0.0.3:40003");
    let (prober_conn, neighbor_conn) = testing::conn_pair(prober_addr, neighbor_addr);

    let (pinger, _replies) = Pinger::new(prober_conn);
    let local_path = Path::local("1-ff00:0:110".parse().unwrap());
    pinger
        .send(neighbor_addr.endhost_addr(), &local_path, 0, 8)
        .await
        .unwrap();

    let (packet, _from) = neighbor_conn.read_from().await.unwrap();
    assert!(matches!(packet.payload, Payload::EchoRequest(_)));
    assert!(packet.path.is_empty());
}

#[tokio::test]
#[timeout(10_000)]
async fn close_is_idempotent_and_unblocks_drain() {
    let prober_addr = addr("1-ff00:0:110,127.0.0.1:40001");
    let remote_addr = addr("1-ff00:0:112,127.0.0.2:40002");
    let (prober_conn, _remote_conn) = testing::conn_pair(prober_addr, remote_addr);

    let (pinger, replies, drain) = spawn_pinger(prober_conn);

    pinger.close();
    pinger.close();
    drain.await.unwrap();

    // Further sends fail with a closed endpoint.
    let path = cross_domain_path("1-ff00:0:110", "1-ff00:0:112");
    let error = pinger
        .send(remote_addr.endhost_addr(), &path, 0, 8)
        .await
        .unwrap_err();
    assert!(matches!(error, ProbeSendError::Send(_)));
    drop(replies);
}
