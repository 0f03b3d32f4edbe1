//! Guarded target URLs.

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use url::Url;

/// A URL that passed the guard, paired with the address the safety
/// decision was made on.
///
/// Only [`crate::security::UrlGuard`] constructs these; fields are private
/// so the pairing cannot be edited afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedUrl {
    url: Url,
    resolved_ip: IpAddr,
}

impl NormalizedUrl {
    pub(crate) fn new(mut url: Url, resolved_ip: IpAddr) -> Self {
        url.set_fragment(None);
        Self { url, resolved_ip }
    }

    /// The normalized URL (no fragment).
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Address the guard classified.
    pub fn resolved_ip(&self) -> IpAddr {
        self.resolved_ip
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host as it appeared in the URL (IPv6 literals without brackets).
    pub fn host(&self) -> &str {
        match self.url.host() {
            Some(url::Host::Ipv6(_)) => self
                .url
                .host_str()
                .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
                .unwrap_or_default(),
            _ => self.url.host_str().unwrap_or_default(),
        }
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// Port, falling back to the scheme default.
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    /// Path plus query, as robots rules see it.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    /// `scheme://host[:port]/robots.txt` for this target.
    pub fn robots_url(&self) -> Url {
        let mut robots = self.url.clone();
        robots.set_path("/robots.txt");
        robots.set_query(None);
        robots
    }

    /// The robots.txt location as a target pinned to the same address.
    pub(crate) fn robots_target(&self) -> NormalizedUrl {
        NormalizedUrl::new(self.robots_url(), self.resolved_ip)
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn target(raw: &str) -> NormalizedUrl {
        NormalizedUrl::new(
            Url::parse(raw).unwrap(),
            IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
        )
    }

    #[test]
    fn test_fragment_dropped() {
        let t = target("https://acme.test/about?x=1#team");
        assert_eq!(t.as_str(), "https://acme.test/about?x=1");
        assert_eq!(t.path_and_query(), "/about?x=1");
    }

    #[test]
    fn test_robots_url_keeps_origin() {
        let t = target("http://acme.test:8080/a/b?c=d");
        assert_eq!(t.robots_url().as_str(), "http://acme.test:8080/robots.txt");
        assert_eq!(t.port(), 8080);
    }

    #[test]
    fn test_ipv6_host_unbracketed() {
        let t = NormalizedUrl::new(
            Url::parse("http://[2606:2800:220:1::]/").unwrap(),
            "2606:2800:220:1::".parse().unwrap(),
        );
        assert_eq!(t.host(), "2606:2800:220:1::");
    }
}
