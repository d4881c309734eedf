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

//! Embedding structured addresses in URL host syntax.
//!
//! The textual form of a structured address (`ia,host` or `ia,host:port`)
//! contains a comma, and the domain identifier itself looks like a second
//! host:port pair, so it cannot stand as the host component of a URL.
//! [`mangle_url`] rewrites such hosts to `[ia,host]`, borrowing the
//! IPv6-literal bracket syntax so URL parsers accept them, and
//! [`unmangle_host_port`] restores the structured form at dial time.
//!
//! Both transforms are pure text manipulation and leave anything that is not
//! a structured address untouched, so they are safe to apply
//! unconditionally.

use pan_proto::address::{EndhostAddr, SocketAddr};

/// Rewrites the URL's host component to its bracketed form if it is a
/// structured address.
///
/// Scheme, userinfo, port, path, and query are preserved untouched. URLs
/// whose host is a plain name, an IP literal, or an already-mangled address
/// pass through unchanged.
pub fn mangle_url(url: &str) -> String {
    let Some((scheme_and_userinfo, host_port, rest)) = split_url(url) else {
        return url.to_string();
    };
    match mangle_host_port(host_port) {
        Some(mangled) => format!("{scheme_and_userinfo}{mangled}{rest}"),
        None => url.to_string(),
    }
}

/// Rewrites `host[:port]` to its bracketed form if the host is a structured
/// address.
fn mangle_host_port(host_port: &str) -> Option<String> {
    if let Ok(address) = host_port.parse::<SocketAddr>() {
        return Some(format!(
            "[{},{}]:{}",
            address.isd_asn(),
            address.host(),
            address.port()
        ));
    }
    host_port
        .parse::<EndhostAddr>()
        .map(|address| format!("[{address}]"))
        .ok()
}

/// Restores a mangled `[ia,host][:port]` string to the structured form
/// expected by the resolver and dial layers.
///
/// The inverse of [`mangle_url`]'s host rewrite: an IPv6 host is bracketed
/// iff a port is present, matching the canonical address text forms.
/// Anything that is not a mangled structured address (including plain
/// `host:port` strings and real IPv6 literals) is returned unchanged.
pub fn unmangle_host_port(host_port: &str) -> String {
    let unmangled = || {
        let rest = host_port.strip_prefix('[')?;
        let (inner, after) = rest.split_once(']')?;
        let address: EndhostAddr = inner.parse().ok()?;

        if after.is_empty() {
            return Some(address.to_string());
        }
        let port: u16 = after.strip_prefix(':')?.parse().ok()?;
        Some(SocketAddr::new(address, port).to_string())
    };
    unmangled().unwrap_or_else(|| host_port.to_string())
}

/// Splits a URL into everything before the host, the host[:port], and
/// everything after.
///
/// Returns None if the string has no authority component.
fn split_url(url: &str) -> Option<(&str, &str, &str)> {
    let scheme_end = url.find("://")? + "://".len();
    let after_scheme = &url[scheme_end..];

    let authority_end = after_scheme
        .find(['/', '?', '#'])
        .unwrap_or(after_scheme.len());
    let authority = &after_scheme[..authority_end];

    // Userinfo ends at the last '@' within the authority.
    let host_start = authority.rfind('@').map_or(0, |at| at + 1);

    Some((
        &url[..scheme_end + host_start],
        &authority[host_start..],
        &after_scheme[authority_end..],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// URL patterns in which a host can be inserted.
    fn host_url_patterns() -> Vec<&'static str> {
        vec![
            "https://{}",
            "https://user@{}",
            "https://{}/hello",
            "https://user@{}/hello",
            "https://{}?boo=bla",
            "https://user@{}?boo=bla",
            "https://{}/hello?boo=bla",
            "https://user@{}/hello?boo=bla",
        ]
    }

    #[test]
    fn mangles_structured_hosts_and_round_trips() {
        let cases = [
            ("foo", "foo"),
            ("foo:80", "foo:80"),
            ("1-ff00:0:110,127.0.0.1", "[1-ff00:0:110,127.0.0.1]"),
            ("1-ff00:0:110,127.0.0.1:80", "[1-ff00:0:110,127.0.0.1]:80"),
            ("1-ff00:0:110,::1", "[1-ff00:0:110,::1]"),
            ("1-ff00:0:110,[::1]", "[1-ff00:0:110,::1]"),
            ("1-ff00:0:110,[::1]:80", "[1-ff00:0:110,::1]:80"),
        ];

        for (host_port, expected_host) in cases {
            for pattern in host_url_patterns() {
                let url = pattern.replace("{}", host_port);
                let expected = pattern.replace("{}", expected_host);

                let mangled = mangle_url(&url);
                assert_eq!(mangled, expected, "mangling {url}");

                // The mangled URL must be independently re-parseable.
                let uri: http::Uri = mangled.parse().unwrap_or_else(|e| {
                    panic!("mangled URL {mangled:?} is not parseable: {e}");
                });
                assert_eq!(uri.scheme_str(), Some("https"));

                // Unmangling restores the canonical structured form. Inputs
                // with a bracketed-but-portless IPv6 host normalize to the
                // bracket-free canonical text.
                let unmangled = unmangle_host_port(expected_host);
                let canonical = match host_port {
                    "1-ff00:0:110,[::1]" => "1-ff00:0:110,::1",
                    other => other,
                };
                assert_eq!(unmangled, canonical, "unmangling {expected_host}");
            }
        }
    }

    #[test]
    fn mangling_is_idempotent() {
        for url in [
            "https://[1-ff00:0:110,127.0.0.1]:80/hello",
            "https://[1-ff00:0:110,::1]",
            "https://example.com:443/x?y=z",
            "https://[::1]:8080/v6",
        ] {
            assert_eq!(mangle_url(url), url);
        }
    }

    #[test]
    fn non_urls_pass_through() {
        assert_eq!(mangle_url("not a url"), "not a url");
        assert_eq!(mangle_url(""), "");
    }

    #[test]
    fn unmangle_leaves_plain_hosts_alone() {
        for host_port in ["foo", "foo:80", "[::1]:443", "[::1]", "127.0.0.1:80"] {
            assert_eq!(unmangle_host_port(host_port), host_port);
        }
    }
}
