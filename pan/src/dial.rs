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

//! The dial contract for HTTP-style transports.
//!
//! [`Transport::connect`] takes a request URL (usually with a
//! [mangled][crate::mangle] host), restores and resolves the address, applies
//! the scheme's default port, and hands the canonical `ia,host:port` text to
//! an injected [`Dialer`]. The dialer owns path selection and the actual
//! connection setup, which keeps the transport testable without network I/O.

use futures::future::BoxFuture;
use pan_proto::{
    address::IsdAsn,
    path::Path,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    mangle::unmangle_host_port,
    resolve::{ResolveError, Resolver, resolve_socket_addr},
};

/// The network name passed to dial functions.
pub const NETWORK: &str = "pan";

/// A bidirectional byte stream produced by a dialer.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// A connection as handed to the HTTP-style transport.
pub type Connection = Box<dyn Stream>;

/// Errors raised when dialing.
#[derive(Debug, Error)]
pub enum DialError {
    /// The URL has no usable authority, or no port and no known scheme
    /// default.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// The host name could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// No forwarding path is available to the destination domain.
    #[error("no path to {0}")]
    NoPath(IsdAsn),
    /// Establishing the connection failed.
    #[error("connecting: {0}")]
    Connect(String),
    /// The underlying socket failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The injectable dial function consumed by [`Transport`].
///
/// The address string is always the unmangled, resolved, port-defaulted
/// `ia,host:port` text.
pub trait Dialer: Send + Sync {
    /// Opens a connection to the given address.
    fn dial(
        &self,
        network: &'static str,
        address: String,
    ) -> BoxFuture<'static, Result<Connection, DialError>>;
}

impl<F> Dialer for F
where
    F: Fn(&'static str, String) -> BoxFuture<'static, Result<Connection, DialError>>
        + Send
        + Sync,
{
    fn dial(
        &self,
        network: &'static str,
        address: String,
    ) -> BoxFuture<'static, Result<Connection, DialError>> {
        self(network, address)
    }
}

/// Supplies the forwarding path for a destination domain.
///
/// Paths are provided externally; this layer only consumes them. Concrete
/// dialers (see [`crate::quic`]) look up a path here when opening
/// connections.
pub trait PathSelector: Send + Sync {
    /// Returns a path to the destination domain, or None if no path is
    /// available.
    fn path_to(&self, destination: IsdAsn) -> Option<Path>;
}

/// A fixed path choice, for callers that select paths themselves.
pub struct StaticPathSelector {
    path: Path,
}

impl StaticPathSelector {
    /// Creates a selector that always returns the given path for its
    /// destination domain.
    pub fn new(path: Path) -> Self {
        Self { path }
    }
}

impl PathSelector for StaticPathSelector {
    fn path_to(&self, destination: IsdAsn) -> Option<Path> {
        (self.path.destination() == destination).then(|| self.path.clone())
    }
}

/// An HTTP-compatible transport front end.
///
/// Owns the resolver capability and the pluggable dial function; see the
/// module documentation for the address pipeline.
pub struct Transport<R, D> {
    resolver: R,
    dialer: D,
}

impl<R: Resolver, D: Dialer> Transport<R, D> {
    /// Creates a transport over the given resolver and dialer.
    pub fn new(resolver: R, dialer: D) -> Self {
        Self { resolver, dialer }
    }

    /// Opens a connection for the given request URL.
    pub async fn connect(&self, url: &str) -> Result<Connection, DialError> {
        let address = self.resolve_url(url)?;
        self.dialer.dial(NETWORK, address).await
    }

    /// Resolves a request URL to the canonical `ia,host:port` dial address.
    fn resolve_url(&self, url: &str) -> Result<String, DialError> {
        let (scheme, host, port) =
            split_url_host(url).ok_or_else(|| DialError::InvalidUrl(url.to_string()))?;
        let port = match port {
            Some(port) => port,
            None => default_port(scheme).ok_or_else(|| DialError::InvalidUrl(url.to_string()))?,
        };

        let host_port = unmangle_host_port(&format!("{host}:{port}"));
        let resolved = resolve_socket_addr(&host_port, &self.resolver)?;
        Ok(resolved.to_string())
    }
}

/// The default port for the given URL scheme.
fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    }
}

/// Splits a URL into scheme, host, and optional port.
fn split_url_host(url: &str) -> Option<(&str, &str, Option<u16>)> {
    let scheme_end = url.find("://")?;
    let scheme = &url[..scheme_end];
    let after_scheme = &url[scheme_end + "://".len()..];

    let authority_end = after_scheme
        .find(['/', '?', '#'])
        .unwrap_or(after_scheme.len());
    let authority = &after_scheme[..authority_end];
    let host_port = &authority[authority.rfind('@').map_or(0, |at| at + 1)..];

    // A bracketed host ends at ']'; everything after a following ':' is the
    // port. Otherwise a single trailing ':port' is split off.
    if let Some(bracket_end) = host_port.rfind(']') {
        let host = &host_port[..=bracket_end];
        match host_port[bracket_end + 1..].strip_prefix(':') {
            Some(port) => Some((scheme, host, Some(port.parse().ok()?))),
            None if host_port.len() == bracket_end + 1 => Some((scheme, host, None)),
            None => None,
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => Some((scheme, host, Some(port.parse().ok()?))),
            None => Some((scheme, host_port, None)),
        }
    }
}
