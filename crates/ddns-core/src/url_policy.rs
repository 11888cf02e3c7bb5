//! Remote URL policy
//!
//! The check-IP endpoint and every vendor template are operator input that
//! the agent will call with a live token. Only `https://` URLs pointing at a
//! public host are accepted, optionally restricted to an allowlist.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};

/// Host restrictions applied to every remote URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlPolicy {
    /// Lowercased hosts that may be contacted; empty means any public host
    allowed_hosts: Vec<String>,
}

impl UrlPolicy {
    /// Policy accepting any public https host
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy restricted to the given hosts
    pub fn with_allowed_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Parse a comma separated allowlist (as found in environment variables)
    pub fn from_allowlist(raw: &str) -> Self {
        Self::with_allowed_hosts(raw.split(','))
    }

    /// Validate a complete URL
    pub fn check_url(&self, url: &str) -> Result<()> {
        self.check(url, false)
    }

    /// Validate the literal prefix of a template
    ///
    /// The host must be fully spelled out before the first placeholder.
    pub fn check_template_prefix(&self, prefix: &str) -> Result<()> {
        self.check(prefix, true)
    }

    fn check(&self, url: &str, require_terminated_host: bool) -> Result<()> {
        let rest = strip_scheme(url)
            .ok_or_else(|| Error::config_invalid(format!("URL must use https://: {url}")))?;

        let end = rest.find(['/', '?', '#']);
        if require_terminated_host && end.is_none() {
            return Err(Error::config_invalid(
                "URL host must not depend on a placeholder",
            ));
        }
        let authority = &rest[..end.unwrap_or(rest.len())];
        let host = host_of(authority).to_lowercase();

        if host.is_empty() {
            return Err(Error::config_invalid("URL must include a hostname"));
        }
        if host == "localhost" {
            return Err(Error::config_invalid("URL hostname cannot be localhost"));
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            if !is_public(ip) {
                return Err(Error::config_invalid(format!(
                    "URL hostname cannot be a loopback or private IP: {host}"
                )));
            }
        }
        if !self.allowed_hosts.is_empty() && !self.allowed_hosts.contains(&host) {
            return Err(Error::config_invalid(format!(
                "URL host {host} is not in the allowlist"
            )));
        }
        Ok(())
    }
}

fn strip_scheme(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    scheme.eq_ignore_ascii_case("https").then_some(rest)
}

/// Host part of `userinfo@host:port`, without brackets for IPv6
fn host_of(authority: &str) -> &str {
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    if let Some(bracketed) = host_port.strip_prefix('[') {
        return bracketed.split(']').next().unwrap_or("");
    }
    host_port.split(':').next().unwrap_or("")
}

fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.octets()[0] >= 240)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    !(ip.is_loopback() || ip.is_multicast() || ip.is_unspecified() || unique_local || link_local)
}
