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

//! Echo probing over chosen paths.
//!
//! A [`Pinger`] owns one packet endpoint and correlates echo replies with
//! its own probes via a random identifier, so several probers can share a
//! network stack. Replies surface asynchronously on a bounded channel in
//! wire arrival order; callers correlate by sequence number, not by channel
//! order. When the channel is full the receive loop waits for space, so a
//! slow consumer stalls draining rather than losing replies.
//!
//! Link-state notifications from the network are delivered on the same
//! channel as failed replies carrying a typed [`ReplyError`]. Wrong
//! identifiers, unexpected payloads, and transient read errors go to a
//! rate-limited error hook and never terminate the loop.

use std::{
    net,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use bytes::BytesMut;
use chrono::{DateTime, TimeDelta, Utc};
use pan_proto::{
    address::{EndhostAddr, IsdAsn, SocketAddr},
    packet::{EchoReply, EchoRequest, Packet, Payload},
    path::{DataPlanePath, Path},
    wire_encoding::WireEncode,
};
use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::endpoint::{PacketConn, PacketRecvError, PacketSendError, UNDERLAY_ENDHOST_PORT};

/// Capacity of the reply channel.
pub const REPLY_CHANNEL_CAPACITY: usize = 10;

/// Minimum probe payload size; the first 8 bytes carry the send timestamp.
pub const MIN_PROBE_PAYLOAD: usize = 8;

/// Minimum interval between two invocations of the error hook.
const ERROR_REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// Errors raised when sending a probe.
#[derive(Debug, Error)]
pub enum ProbeSendError {
    /// The remote is in a different domain and no path was supplied.
    #[error("no path for remote domain (local {local}, remote {remote})")]
    NoPath {
        /// The prober's domain.
        local: IsdAsn,
        /// The remote's domain.
        remote: IsdAsn,
    },
    /// The supplied path carries no underlay next hop.
    #[error("path has no underlay next hop")]
    MissingNextHop,
    /// The underlying write failed.
    #[error(transparent)]
    Send(#[from] PacketSendError),
}

/// Non-fatal conditions reported to the error hook.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Reading from the endpoint failed transiently.
    #[error("reading packet: {0}")]
    Receive(#[from] PacketRecvError),
    /// A reply carried another prober's identifier.
    #[error("wrong echo identifier: expected {expected}, actual {actual}")]
    WrongIdentifier {
        /// This prober's identifier.
        expected: u16,
        /// The identifier found in the reply.
        actual: u16,
    },
    /// An inbound packet carried a payload that is not a reply or a known
    /// notification.
    #[error("unexpected payload kind")]
    UnexpectedPayload,
}

/// Typed failures delivered on the reply channel in place of an echo reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    /// A link between two domains on the path is down.
    #[error("external interface down {isd_asn} {interface}")]
    ExternalInterfaceDown {
        /// The domain reporting the failure.
        isd_asn: IsdAsn,
        /// The failed interface.
        interface: u64,
        /// The path the notification arrived over.
        path: DataPlanePath,
    },
    /// Connectivity inside a domain on the path is down.
    #[error("internal connectivity down {isd_asn} {ingress} {egress}")]
    InternalConnectivityDown {
        /// The domain reporting the failure.
        isd_asn: IsdAsn,
        /// The ingress interface of the broken connection.
        ingress: u64,
        /// The egress interface of the broken connection.
        egress: u64,
        /// The path the notification arrived over.
        path: DataPlanePath,
    },
}

/// A probe result delivered on the reply channel.
#[derive(Debug, Clone)]
pub struct Reply {
    /// When the reply was received.
    pub received: DateTime<Utc>,
    /// The endhost (or router) that sent the reply.
    pub source: EndhostAddr,
    /// The path the reply traversed.
    pub path: DataPlanePath,
    /// The encoded size of the reply packet in bytes.
    pub size: usize,
    /// The echo reply, or the typed failure that arrived in its place.
    pub reply: Result<EchoReply, ReplyError>,
}

impl Reply {
    /// The round-trip time of the probe, computed from the send timestamp
    /// embedded in the reply payload and rounded to microseconds.
    ///
    /// None for failed replies and replies too short to carry a timestamp.
    pub fn rtt(&self) -> Option<TimeDelta> {
        let reply = self.reply.as_ref().ok()?;
        let sent = u64::from_be_bytes(reply.data.get(..8)?.try_into().ok()?);
        let elapsed = self.received.timestamp_nanos_opt()? - sent as i64;
        let micros = if elapsed >= 0 {
            (elapsed + 500) / 1000
        } else {
            (elapsed - 500) / 1000
        };
        Some(TimeDelta::microseconds(micros))
    }
}

/// The hook invoked for non-fatal probe errors.
pub type ErrorHandler = Box<dyn Fn(&ProbeError) + Send + Sync>;

/// An echo prober bound to one packet endpoint.
///
/// Created with [`Pinger::new`]; run [`drain`][Pinger::drain] as its own
/// task to receive replies, and [`close`][Pinger::close] to stop it.
pub struct Pinger {
    id: u16,
    conn: Arc<dyn PacketConn>,
    local: SocketAddr,
    replies: mpsc::Sender<Reply>,
    error_handler: Mutex<Option<ErrorHandler>>,
    last_error_report: Mutex<Option<Instant>>,
    cancel: CancellationToken,
}

impl Pinger {
    /// Registers a prober on the given endpoint.
    ///
    /// Returns the prober handle and the bounded reply channel.
    pub fn new(conn: Arc<dyn PacketConn>) -> (Self, mpsc::Receiver<Reply>) {
        let (replies, receiver) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
        let pinger = Self {
            id: rand::rng().random(),
            local: conn.local_addr(),
            conn,
            replies,
            error_handler: Mutex::new(None),
            last_error_report: Mutex::new(None),
            cancel: CancellationToken::new(),
        };
        (pinger, receiver)
    }

    /// Sets the hook invoked for errors that do not abort probing.
    ///
    /// The hook runs synchronously on the drain task and is invoked at most
    /// once per 500ms, so it must be fast.
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.lock().unwrap() = Some(handler);
    }

    /// The identifier carried in this prober's probes.
    pub fn identifier(&self) -> u16 {
        self.id
    }

    /// Sends one probe to the remote endhost over the given path.
    ///
    /// The payload is `max(size, 8)` bytes, with the send timestamp in the
    /// first eight. An empty path is only valid towards the local domain,
    /// where the well-known endhost port serves as the next hop.
    pub async fn send(
        &self,
        remote: EndhostAddr,
        path: &Path,
        sequence_number: u16,
        size: usize,
    ) -> Result<(), ProbeSendError> {
        let next_hop = if path.is_empty() {
            if self.local.isd_asn() == remote.isd_asn() {
                net::SocketAddr::new(remote.host(), UNDERLAY_ENDHOST_PORT)
            } else {
                return Err(ProbeSendError::NoPath {
                    local: self.local.isd_asn(),
                    remote: remote.isd_asn(),
                });
            }
        } else {
            path.underlay_next_hop
                .ok_or(ProbeSendError::MissingNextHop)?
        };

        let mut data = BytesMut::zeroed(size.max(MIN_PROBE_PAYLOAD));
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        data[..8].copy_from_slice(&(now as u64).to_be_bytes());

        let packet = Packet {
            source: self.local.endhost_addr(),
            destination: remote,
            path: path.data_plane_path.clone(),
            payload: EchoRequest::new(self.id, sequence_number, data.freeze()).into(),
        };
        self.conn.write_to(packet, next_hop).await?;
        Ok(())
    }

    /// Receives and classifies inbound packets until the prober is closed.
    ///
    /// Run this as its own task; it returns promptly after
    /// [`close`][Pinger::close] or when the reply receiver is dropped.
    pub async fn drain(&self) {
        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return,
                received = self.conn.read_from() => received,
            };
            match received {
                Ok((packet, _from)) => {
                    if !self.handle_packet(packet).await {
                        return;
                    }
                }
                Err(PacketRecvError::Closed) => return,
                Err(error) => self.report_error(&ProbeError::Receive(error)),
            }
        }
    }

    /// Classifies one packet; returns false when draining should stop.
    async fn handle_packet(&self, packet: Packet) -> bool {
        let received = Utc::now();
        let size = packet.encoded_length();

        let reply = match packet.payload {
            Payload::EchoReply(echo) => {
                if echo.identifier != self.id {
                    self.report_error(&ProbeError::WrongIdentifier {
                        expected: self.id,
                        actual: echo.identifier,
                    });
                    return true;
                }
                Ok(echo)
            }
            Payload::ExternalInterfaceDown(notification) => {
                Err(ReplyError::ExternalInterfaceDown {
                    isd_asn: notification.isd_asn,
                    interface: notification.interface,
                    path: packet.path.clone(),
                })
            }
            Payload::InternalConnectivityDown(notification) => {
                Err(ReplyError::InternalConnectivityDown {
                    isd_asn: notification.isd_asn,
                    ingress: notification.ingress,
                    egress: notification.egress,
                    path: packet.path.clone(),
                })
            }
            _ => {
                self.report_error(&ProbeError::UnexpectedPayload);
                return true;
            }
        };

        let reply = Reply {
            received,
            source: packet.source,
            path: packet.path,
            size,
            reply,
        };
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.replies.send(reply) => sent.is_ok(),
        }
    }

    fn report_error(&self, error: &ProbeError) {
        let handler = self.error_handler.lock().unwrap();
        let Some(handler) = handler.as_ref() else {
            return;
        };
        let mut last = self.last_error_report.lock().unwrap();
        let now = Instant::now();
        if last.is_none_or(|at| now.duration_since(at) > ERROR_REPORT_INTERVAL) {
            handler(error);
            *last = Some(now);
        }
    }

    /// Closes the prober and releases the endpoint.
    ///
    /// Idempotent, and safe to call while [`drain`][Pinger::drain] is
    /// running; the drain task observes the cancellation and returns.
    pub fn close(&self) {
        self.cancel.cancel();
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn rtt_rounds_to_microseconds() {
        let t0 = Utc::now();
        let sent_nanos = t0.timestamp_nanos_opt().unwrap() as u64;
        let mut data = vec![0u8; 8];
        data.copy_from_slice(&sent_nanos.to_be_bytes());

        let elapsed_nanos = 1_234_567;
        let reply = Reply {
            received: t0 + TimeDelta::nanoseconds(elapsed_nanos),
            source: "1-ff00:0:110,127.0.0.1".parse().unwrap(),
            path: DataPlanePath::EmptyPath,
            size: 0,
            reply: Ok(EchoReply::new(1, 0, Bytes::from(data))),
        };
        assert_eq!(reply.rtt(), Some(TimeDelta::microseconds(1235)));
    }

    #[test]
    fn rtt_is_none_for_failures_and_short_payloads() {
        let failed = Reply {
            received: Utc::now(),
            source: "1-ff00:0:110,127.0.0.1".parse().unwrap(),
            path: DataPlanePath::EmptyPath,
            size: 0,
            reply: Err(ReplyError::ExternalInterfaceDown {
                isd_asn: "1-ff00:0:110".parse().unwrap(),
                interface: 2,
                path: DataPlanePath::EmptyPath,
            }),
        };
        assert_eq!(failed.rtt(), None);

        let short = Reply {
            reply: Ok(EchoReply::new(1, 0, Bytes::from_static(&[0; 4]))),
            ..failed
        };
        assert_eq!(short.rtt(), None);
    }
}
