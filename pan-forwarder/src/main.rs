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

//! TLS tunnel forwarder.
//!
//! Listens for path-aware QUIC sessions, optionally restricted by a path
//! access-control list, and relays each session's single stream to a fixed
//! local TLS backend. One log line is emitted per session in a Common Log
//! Format style, with an HTTP-like status code reused to mean the tunnel
//! outcome (200 forwarded, 503 backend unavailable).

use std::{net, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use pan::{
    acl::AccessControlList,
    dial::PathSelector,
    filter::PacketFilter,
    quic::{self, Endpoint, SINGLE_STREAM_ALPN},
    udp::UdpPacketConn,
};
use pan_proto::{
    address::{IsdAsn, SocketAddr},
    path::Path,
};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// The fixed local backend sessions are relayed to.
const BACKEND_ADDR: &str = "127.0.0.1:443";

/// Tunnel forwarder for path-aware networks.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Opts {
    /// Path to the path-based access-control list. Without one, sessions
    /// are accepted over any path.
    #[arg(long)]
    acl: Option<PathBuf>,

    /// Local listen address, as `ia,host:port`.
    #[arg(long)]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Opts::parse();
    setup_tracing();

    if let Err(error) = run(opts).await {
        error!(error = format!("{error:#}"), "forwarder failed");
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}

fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let acl = match &opts.acl {
        Some(path) => {
            let acl = AccessControlList::load(path)
                .with_context(|| format!("loading ACL from {}", path.display()))?;
            info!(path = %path.display(), domains = acl.len(), "loaded path ACL");
            Some(acl)
        }
        None => {
            warn!("no ACL file provided, accepting any paths");
            None
        }
    };

    let underlay = net::SocketAddr::new(opts.addr.host(), opts.addr.port());
    let conn = UdpPacketConn::bind(opts.addr.endhost_addr(), underlay)
        .await
        .with_context(|| format!("binding {underlay}"))?;

    let server_config =
        quic::self_signed_server_config(SINGLE_STREAM_ALPN).context("building TLS config")?;
    let endpoint = Endpoint::new(
        Arc::new(conn),
        PacketFilter::new(acl),
        Arc::new(ReversePathsOnly),
        Some(server_config),
    )
    .context("creating QUIC endpoint")?;
    info!(addr = %endpoint.local_addr(), "server listening");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            session = endpoint.accept() => match session {
                None => break,
                Some(Ok((connection, remote))) => {
                    tokio::spawn(forward_session(connection, remote));
                }
                Some(Err(error)) => warn!(error = %error, "accepting session failed"),
            }
        }
    }

    info!("shutting down");
    Ok(())
}

/// The listener only ever replies along reverse paths of inbound packets.
struct ReversePathsOnly;

impl PathSelector for ReversePathsOnly {
    fn path_to(&self, _destination: IsdAsn) -> Option<Path> {
        None
    }
}

/// Relays one session's stream to the backend.
async fn forward_session(connection: quinn::Connection, remote: SocketAddr) {
    let (send, recv) = match connection.accept_bi().await {
        Ok(stream) => stream,
        Err(error) => {
            debug!(client = %remote, error = %error, "session ended before stream open");
            return;
        }
    };

    let mut backend = match TcpStream::connect(BACKEND_ADDR).await {
        Ok(backend) => backend,
        Err(error) => {
            debug!(client = %remote, error = %error, "backend unavailable");
            log_session(&remote, 503);
            connection.close(503u32.into(), b"service unavailable");
            return;
        }
    };

    log_session(&remote, 200);
    let mut client = tokio::io::join(recv, send);
    if let Err(error) = tokio::io::copy_bidirectional(&mut client, &mut backend).await {
        debug!(client = %remote, error = %error, "relay ended");
    }
}

/// Emits the per-session log line.
fn log_session(client: &SocketAddr, status: u16) {
    let timestamp = chrono::Local::now().format("%d/%b/%Y:%H:%M:%S %z");
    println!("{}", session_log_line(client, &timestamp.to_string(), status));
}

fn session_log_line(client: &SocketAddr, timestamp: &str, status: u16) -> String {
    format!("{client} - - [{timestamp}] \"TUNNEL \" {status} -")
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(signal) => signal,
            Err(error) => {
                error!(error = %error, "registering SIGINT handler failed");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(error) => {
                error!(error = %error, "registering SIGTERM handler failed");
                return;
            }
        };
        tokio::select! {
            _ = sigint.recv() => debug!("received SIGINT"),
            _ = sigterm.recv() => debug!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(error = %error, "registering CTRL-C handler failed");
        }
    }
}
