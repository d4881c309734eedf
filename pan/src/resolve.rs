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

//! Resolution of symbolic names to structured addresses.
//!
//! The resolver capability is injected by the application; this module only
//! fixes the contract and provides an in-memory table implementation.

use std::collections::HashMap;

use pan_proto::address::{EndhostAddr, SocketAddr};
use thiserror::Error;

/// Errors raised when resolving a name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The name is not known to the resolver.
    #[error("host not found: {host}")]
    HostNotFound {
        /// The name that could not be resolved.
        host: String,
    },
    /// The input is not a name or address the resolver can work with.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// The resolver failed for another reason.
    #[error("resolving {host}: {message}")]
    Other {
        /// The name being resolved.
        host: String,
        /// A description of the failure.
        message: String,
    },
}

/// Resolves symbolic host names to structured addresses.
///
/// Resolution is a pure lookup; it performs no path selection.
pub trait Resolver: Send + Sync {
    /// Resolves a symbolic host name to a structured address.
    ///
    /// Unknown names fail with [`ResolveError::HostNotFound`].
    fn resolve(&self, name: &str) -> Result<EndhostAddr, ResolveError>;
}

/// A resolver backed by a fixed name table.
#[derive(Debug, Clone, Default)]
pub struct TableResolver {
    table: HashMap<String, EndhostAddr>,
}

impl TableResolver {
    /// Creates a resolver over the given table.
    pub fn new(table: HashMap<String, EndhostAddr>) -> Self {
        Self { table }
    }
}

impl<S: Into<String>> FromIterator<(S, EndhostAddr)> for TableResolver {
    fn from_iter<T: IntoIterator<Item = (S, EndhostAddr)>>(entries: T) -> Self {
        Self::new(
            entries
                .into_iter()
                .map(|(name, address)| (name.into(), address))
                .collect(),
        )
    }
}

impl Resolver for TableResolver {
    fn resolve(&self, name: &str) -> Result<EndhostAddr, ResolveError> {
        self.table
            .get(name)
            .copied()
            .ok_or_else(|| ResolveError::HostNotFound {
                host: name.to_string(),
            })
    }
}

/// Turns `host:port` text into a concrete socket address.
///
/// Literal structured addresses pass through without consulting the
/// resolver; symbolic names are resolved and the port reattached.
pub fn resolve_socket_addr(
    host_port: &str,
    resolver: &dyn Resolver,
) -> Result<SocketAddr, ResolveError> {
    if let Ok(address) = host_port.parse::<SocketAddr>() {
        return Ok(address);
    }

    let (name, port) = host_port
        .rsplit_once(':')
        .ok_or_else(|| ResolveError::InvalidAddress(host_port.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ResolveError::InvalidAddress(host_port.to_string()))?;

    let address = resolver.resolve(name)?;
    Ok(SocketAddr::new(address, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TableResolver {
        [("host", "1-ff00:0:1,192.0.2.1".parse().unwrap())]
            .into_iter()
            .collect()
    }

    #[test]
    fn resolves_known_names() {
        let address = resolve_socket_addr("host:443", &resolver()).unwrap();
        assert_eq!(address.to_string(), "1-ff00:0:1,192.0.2.1:443");
    }

    #[test]
    fn literal_addresses_bypass_the_resolver() {
        let address = resolve_socket_addr("1-ff00:0:110,[::1]:80", &resolver()).unwrap();
        assert_eq!(address.to_string(), "1-ff00:0:110,[::1]:80");
    }

    #[test]
    fn unknown_names_are_distinguishable() {
        let error = resolve_socket_addr("nope:443", &resolver()).unwrap_err();
        assert_eq!(
            error,
            ResolveError::HostNotFound {
                host: "nope".to_string()
            }
        );
    }

    #[test]
    fn missing_port_is_invalid() {
        assert!(matches!(
            resolve_socket_addr("host", &resolver()),
            Err(ResolveError::InvalidAddress(_))
        ));
    }
}
