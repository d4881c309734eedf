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

//! End-to-end tests for the path-aware QUIC endpoint over an in-memory
//! endpoint pair.

use std::{sync::Arc, time::Duration};

use ntest::timeout;
use pan::{
    acl::AccessControlList,
    dial::StaticPathSelector,
    filter::PacketFilter,
    quic::{Endpoint, SINGLE_STREAM_ALPN, self_signed_server_config},
    testing,
};
use pan_proto::{
    address::SocketAddr,
    packet::ByEndpoint,
    path::{DataPlanePath, MetaHeader, Path, PathFingerprint, StandardPath},
};
use rustls::{
    DigitallySignedStruct,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
};

fn addr(text: &str) -> SocketAddr {
    text.parse().unwrap()
}

fn client_to_server_path() -> Path {
    let meta = MetaHeader {
        segment_lengths: [2, 0, 0],
        ..Default::default()
    };
    Path::new(
        DataPlanePath::Standard(StandardPath::zeroed(meta).unwrap()),
        ByEndpoint {
            source: "1-ff00:0:112".parse().unwrap(),
            destination: "1-ff00:0:110".parse().unwrap(),
        },
        Some("127.0.0.1:30041".parse().unwrap()),
    )
}

/// Accepts any server certificate; the tests use a fresh self-signed one.
#[derive(Debug)]
struct SkipServerVerification(rustls::crypto::CryptoProvider);

impl SkipServerVerification {
    fn new() -> Arc<Self> {
        Arc::new(Self(rustls::crypto::ring::default_provider()))
    }
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn insecure_client_config() -> quinn::ClientConfig {
    let mut tls = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(SkipServerVerification::new())
        .with_no_client_auth();
    tls.alpn_protocols = vec![SINGLE_STREAM_ALPN.to_vec()];

    let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls).unwrap();
    let mut config = quinn::ClientConfig::new(Arc::new(crypto));

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(Duration::from_secs(2).try_into().unwrap()));
    config.transport_config(Arc::new(transport));
    config
}

fn endpoints_with_server_acl(
    acl: Option<AccessControlList>,
) -> (Endpoint, Endpoint, SocketAddr) {
    let server_addr = addr("1-ff00:0:110,127.0.0.1:40001");
    let client_addr = addr("1-ff00:0:112,127.0.0.2:40002");
    let (server_conn, client_conn) = testing::conn_pair(server_addr, client_addr);

    let server = Endpoint::new(
        server_conn,
        PacketFilter::new(acl),
        Arc::new(StaticPathSelector::new(Path::local(
            "1-ff00:0:110".parse().unwrap(),
        ))),
        Some(self_signed_server_config(SINGLE_STREAM_ALPN).unwrap()),
    )
    .unwrap();

    let mut client = Endpoint::new(
        client_conn,
        PacketFilter::default(),
        Arc::new(StaticPathSelector::new(client_to_server_path())),
        None,
    )
    .unwrap();
    client.set_default_client_config(insecure_client_config());

    (server, client, server_addr)
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
#[timeout(30_000)]
async fn relays_stream_over_allowed_path() {
    let path_fingerprint = *client_to_server_path().fingerprint();
    let acl: AccessControlList = [("1-ff00:0:112".parse().unwrap(), vec![path_fingerprint])]
        .into_iter()
        .collect();
    let (server, client, server_addr) = endpoints_with_server_acl(Some(acl));

    let server_task = tokio::spawn(async move {
        let (connection, remote) = server
            .accept()
            .await
            .expect("incoming session expected")
            .expect("handshake expected to succeed");
        assert_eq!(remote.isd_asn(), "1-ff00:0:112".parse().unwrap());

        let (mut send, mut recv) = connection.accept_bi().await.unwrap();
        let mut buffer = [0u8; 5];
        recv.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"hello");
        send.write_all(b"world").await.unwrap();
        send.finish().unwrap();
        let _ = connection.closed().await;
    });

    let connection = client
        .connect(server_addr, "pan")
        .unwrap()
        .await
        .expect("client handshake expected to succeed");
    let (mut send, mut recv) = connection.open_bi().await.unwrap();
    send.write_all(b"hello").await.unwrap();

    let mut buffer = [0u8; 5];
    recv.read_exact(&mut buffer).await.unwrap();
    assert_eq!(&buffer, b"world");

    connection.close(0u32.into(), b"done");
    server_task.await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
#[timeout(30_000)]
async fn handshake_fails_over_unlisted_path() {
    // The ACL lists the client's domain but a different fingerprint, so the
    // server never sees the handshake packets.
    let other = PathFingerprint::from([0xaa; 32]);
    let acl: AccessControlList = [("1-ff00:0:112".parse().unwrap(), vec![other])]
        .into_iter()
        .collect();
    let (server, client, server_addr) = endpoints_with_server_acl(Some(acl));

    let result = client.connect(server_addr, "pan").unwrap().await;
    assert!(result.is_err(), "handshake unexpectedly succeeded");
    drop(server);
}
