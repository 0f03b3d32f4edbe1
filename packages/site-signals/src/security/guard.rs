//! URL guard for SSRF protection.
//!
//! Validates a user-supplied URL before anything touches the network:
//! - Scheme must be in the policy's allowed set (no file://, ftp://, ...)
//! - URL must carry a host
//! - Host must resolve, and the address we will connect to must not be
//!   private, loopback, link-local, reserved, multicast or unspecified
//!   (unless the policy explicitly allows it)

use async_trait::async_trait;
use ipnet::{Ipv4Net, Ipv6Net};
use lazy_static::lazy_static;
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::debug;
use url::{Host, Url};

use crate::error::{GuardError, GuardResult};
use crate::types::{NormalizedUrl, TargetPolicy};

/// Network class of an address the guard refuses to fetch from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressClass {
    Private,
    Loopback,
    LinkLocal,
    Reserved,
    Multicast,
    Unspecified,
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressClass::Private => "private",
            AddressClass::Loopback => "loopback",
            AddressClass::LinkLocal => "link-local",
            AddressClass::Reserved => "reserved",
            AddressClass::Multicast => "multicast",
            AddressClass::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

lazy_static! {
    static ref V4_RANGES: Vec<(Ipv4Net, AddressClass)> = [
        ("0.0.0.0/32", AddressClass::Unspecified),
        ("127.0.0.0/8", AddressClass::Loopback),
        ("169.254.0.0/16", AddressClass::LinkLocal), // Link-local / cloud metadata
        ("224.0.0.0/4", AddressClass::Multicast),
        ("10.0.0.0/8", AddressClass::Private),
        ("172.16.0.0/12", AddressClass::Private),
        ("192.168.0.0/16", AddressClass::Private),
        ("100.64.0.0/10", AddressClass::Private), // Carrier-grade NAT
        ("0.0.0.0/8", AddressClass::Reserved),
        ("192.0.0.0/24", AddressClass::Reserved),
        ("192.0.2.0/24", AddressClass::Reserved),
        ("198.18.0.0/15", AddressClass::Reserved),
        ("198.51.100.0/24", AddressClass::Reserved),
        ("203.0.113.0/24", AddressClass::Reserved),
        ("240.0.0.0/4", AddressClass::Reserved), // includes broadcast
    ]
    .into_iter()
    .map(|(cidr, class)| (cidr.parse().unwrap(), class))
    .collect();

    static ref V6_RANGES: Vec<(Ipv6Net, AddressClass)> = [
        ("::/128", AddressClass::Unspecified),
        ("::1/128", AddressClass::Loopback),
        ("ff00::/8", AddressClass::Multicast),
        ("fe80::/10", AddressClass::LinkLocal),
        ("fc00::/7", AddressClass::Private),
        ("fec0::/10", AddressClass::Reserved), // Deprecated site-local
        ("::/8", AddressClass::Reserved),
        ("100::/64", AddressClass::Reserved),
        ("2001::/23", AddressClass::Reserved),
        ("2001:db8::/32", AddressClass::Reserved),
    ]
    .into_iter()
    .map(|(cidr, class)| (cidr.parse().unwrap(), class))
    .collect();
}

/// Classify an address, returning `None` for globally routable ones.
pub fn classify(ip: IpAddr) -> Option<AddressClass> {
    match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

fn classify_v4(ip: Ipv4Addr) -> Option<AddressClass> {
    V4_RANGES
        .iter()
        .find(|(net, _)| net.contains(&ip))
        .map(|(_, class)| *class)
}

fn classify_v6(ip: Ipv6Addr) -> Option<AddressClass> {
    // Addresses that tunnel an IPv4 address are judged by that address
    if let Some(v4) = embedded_v4(ip) {
        return classify_v4(v4);
    }
    V6_RANGES
        .iter()
        .find(|(net, _)| net.contains(&ip))
        .map(|(_, class)| *class)
}

fn embedded_v4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let s = ip.segments();
    match s {
        // ::ffff:a.b.c.d (IPv4-mapped)
        [0, 0, 0, 0, 0, 0xffff, hi, lo] => Some(v4_from(hi, lo)),
        // 64:ff9b::a.b.c.d (NAT64)
        [0x64, 0xff9b, 0, 0, 0, 0, hi, lo] => Some(v4_from(hi, lo)),
        // 2002:aabb:ccdd::/48 (6to4)
        [0x2002, hi, lo, ..] => Some(v4_from(hi, lo)),
        _ => None,
    }
}

fn v4_from(hi: u16, lo: u16) -> Ipv4Addr {
    Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8)
}

/// Hostname resolution, abstracted so the guard can be tested offline.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host` to zero or more addresses.
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (via tokio).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// The first stage of the pipeline.
#[derive(Clone)]
pub struct UrlGuard {
    resolver: Arc<dyn Resolver>,
}

impl Default for UrlGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UrlGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlGuard").finish_non_exhaustive()
    }
}

impl UrlGuard {
    /// Guard using the system resolver.
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(SystemResolver),
        }
    }

    /// Guard using a custom resolver.
    pub fn with_resolver(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    /// Validate, resolve and normalize a raw URL.
    pub async fn check(&self, raw: &str, policy: &TargetPolicy) -> GuardResult<NormalizedUrl> {
        let url = parse(raw)?;

        if !policy.allows_scheme(url.scheme()) {
            return Err(GuardError::DisallowedScheme(url.scheme().to_string()));
        }

        let host = url.host().ok_or(GuardError::NoHost)?.to_owned();
        let ip = match &host {
            Host::Ipv4(v4) => IpAddr::V4(*v4),
            Host::Ipv6(v6) => IpAddr::V6(*v6),
            Host::Domain(domain) => {
                if domain.is_empty() {
                    return Err(GuardError::NoHost);
                }
                let port = url.port_or_known_default().unwrap_or(80);
                self.resolve_preferring_v4(domain, port).await?
            }
        };

        screen_address(&host.to_string(), ip, policy)?;

        debug!(url = %url, ip = %ip, "target accepted");
        Ok(NormalizedUrl::new(url, ip))
    }

    async fn resolve_preferring_v4(&self, domain: &str, port: u16) -> GuardResult<IpAddr> {
        let addrs = self
            .resolver
            .resolve(domain, port)
            .await
            .map_err(|e| GuardError::Unresolvable {
                host: domain.to_string(),
                reason: e.to_string(),
            })?;

        pick_address(&addrs).ok_or_else(|| GuardError::Unresolvable {
            host: domain.to_string(),
            reason: "no addresses".to_string(),
        })
    }
}

/// The address a connection will use: first IPv4, else the first one.
pub(crate) fn pick_address(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

/// Reject `ip` when the policy disallows its address class.
pub(crate) fn screen_address(host: &str, ip: IpAddr, policy: &TargetPolicy) -> GuardResult<()> {
    if !policy.disallow_private_ips {
        return Ok(());
    }
    match classify(ip) {
        Some(class) => Err(GuardError::UnsafeAddress {
            host: host.to_string(),
            ip,
            class,
        }),
        None => Ok(()),
    }
}

fn parse(raw: &str) -> GuardResult<Url> {
    match Url::parse(raw.trim()) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Err(GuardError::DisallowedScheme(String::new()))
        }
        Err(url::ParseError::EmptyHost) => Err(GuardError::NoHost),
        Err(e) => Err(GuardError::UrlParse(e)),
    }
}

/// Screen a redirect hop without DNS.
///
/// Redirect policies run synchronously, so only the scheme and literal IP
/// hosts can be checked here; named hosts are screened when the fetcher's
/// [`GuardedDns`](super::GuardedDns) resolves them.
pub fn screen_redirect(next: &Url, policy: &TargetPolicy) -> Result<(), String> {
    if !policy.allows_scheme(next.scheme()) {
        return Err(format!("redirect to disallowed scheme {}", next.scheme()));
    }
    let ip = match next.host() {
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
        Some(Host::Domain(_)) => return Ok(()),
        None => return Err("redirect without host".to_string()),
    };
    if policy.disallow_private_ips {
        if let Some(class) = classify(ip) {
            return Err(format!("redirect to {} address {}", class, ip));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticResolver;
    use proptest::prelude::*;

    fn guard() -> UrlGuard {
        UrlGuard::with_resolver(Arc::new(
            StaticResolver::new()
                .with_host("acme.test", ["93.184.216.34"])
                .with_host("dual.test", ["2606:2800:220:1::", "93.184.216.35"])
                .with_host("v6only.test", ["2606:2800:220:1::"])
                .with_host("internal.test", ["10.1.2.3"])
                .with_host("localhost", ["127.0.0.1"])
                .with_host("empty.test", Vec::<&str>::new()),
        ))
    }

    fn strict() -> TargetPolicy {
        TargetPolicy::default()
    }

    fn lenient() -> TargetPolicy {
        TargetPolicy::default().with_private_ips_disallowed(false)
    }

    #[tokio::test]
    async fn test_accepts_public_host() {
        let target = guard()
            .check("https://acme.test/about#team", &strict())
            .await
            .unwrap();
        assert_eq!(target.as_str(), "https://acme.test/about");
        assert_eq!(target.resolved_ip().to_string(), "93.184.216.34");
    }

    #[tokio::test]
    async fn test_prefers_ipv4() {
        let target = guard().check("https://dual.test/", &strict()).await.unwrap();
        assert!(target.resolved_ip().is_ipv4());

        let target = guard().check("https://v6only.test/", &strict()).await.unwrap();
        assert!(target.resolved_ip().is_ipv6());
    }

    #[tokio::test]
    async fn test_blocks_non_http() {
        let g = guard();
        for raw in ["file:///etc/passwd", "ftp://acme.test/", "gopher://acme.test/"] {
            let err = g.check(raw, &strict()).await.unwrap_err();
            assert_eq!(err.reason_code(), "bad_scheme", "{raw}");
        }
    }

    #[tokio::test]
    async fn test_missing_scheme_is_bad_scheme() {
        let err = guard().check("acme.test/about", &strict()).await.unwrap_err();
        assert_eq!(err.reason_code(), "bad_scheme");
    }

    #[tokio::test]
    async fn test_missing_host() {
        let err = guard().check("http://", &strict()).await.unwrap_err();
        assert_eq!(err.reason_code(), "no_host");
    }

    #[tokio::test]
    async fn test_unresolvable() {
        let g = guard();
        let err = g.check("https://nowhere.test/", &strict()).await.unwrap_err();
        assert_eq!(err.reason_code(), "unresolvable_host");

        let err = g.check("https://empty.test/", &strict()).await.unwrap_err();
        assert_eq!(err.reason_code(), "unresolvable_host");
    }

    #[tokio::test]
    async fn test_blocks_localhost() {
        let g = guard();
        for raw in ["http://localhost/", "http://127.0.0.1/", "http://[::1]/"] {
            let err = g.check(raw, &strict()).await.unwrap_err();
            assert_eq!(err.reason_code(), "unsafe_ip", "{raw}");
        }
    }

    #[tokio::test]
    async fn test_blocks_dns_to_private() {
        let err = guard()
            .check("https://internal.test/", &strict())
            .await
            .unwrap_err();
        match err {
            GuardError::UnsafeAddress { class, .. } => assert_eq!(class, AddressClass::Private),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blocks_metadata_service() {
        let err = guard()
            .check("http://169.254.169.254/latest/meta-data", &strict())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GuardError::UnsafeAddress {
                class: AddressClass::LinkLocal,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_lenient_policy_allows_private() {
        let target = guard()
            .check("http://localhost:8080/x", &lenient())
            .await
            .unwrap();
        assert_eq!(target.port(), 8080);
    }

    #[test]
    fn test_classify_examples() {
        let cases = [
            ("10.0.0.1", Some(AddressClass::Private)),
            ("172.16.0.1", Some(AddressClass::Private)),
            ("192.168.1.1", Some(AddressClass::Private)),
            ("127.0.0.1", Some(AddressClass::Loopback)),
            ("169.254.169.254", Some(AddressClass::LinkLocal)),
            ("224.0.0.1", Some(AddressClass::Multicast)),
            ("0.0.0.0", Some(AddressClass::Unspecified)),
            ("240.0.0.1", Some(AddressClass::Reserved)),
            ("255.255.255.255", Some(AddressClass::Reserved)),
            ("::1", Some(AddressClass::Loopback)),
            ("::", Some(AddressClass::Unspecified)),
            ("fe80::1", Some(AddressClass::LinkLocal)),
            ("fd00::1", Some(AddressClass::Private)),
            ("ff02::1", Some(AddressClass::Multicast)),
            ("::ffff:127.0.0.1", Some(AddressClass::Loopback)),
            ("::ffff:10.0.0.1", Some(AddressClass::Private)),
            ("93.184.216.34", None),
            ("8.8.8.8", None),
            ("2606:4700:4700::1111", None),
        ];
        for (raw, expected) in cases {
            assert_eq!(classify(raw.parse().unwrap()), expected, "{raw}");
        }
    }

    #[test]
    fn test_screen_redirect() {
        let policy = strict();
        assert!(screen_redirect(&Url::parse("https://acme.test/x").unwrap(), &policy).is_ok());
        assert!(screen_redirect(&Url::parse("http://127.0.0.1/").unwrap(), &policy).is_err());
        assert!(screen_redirect(&Url::parse("ftp://acme.test/").unwrap(), &policy).is_err());
        assert!(screen_redirect(&Url::parse("http://127.0.0.1/").unwrap(), &lenient()).is_ok());
    }

    fn unsafe_v4() -> impl Strategy<Value = Ipv4Addr> {
        prop_oneof![
            any::<[u8; 3]>().prop_map(|[b, c, d]| Ipv4Addr::new(10, b, c, d)),
            (16u8..32, any::<[u8; 2]>()).prop_map(|(b, [c, d])| Ipv4Addr::new(172, b, c, d)),
            any::<[u8; 2]>().prop_map(|[c, d]| Ipv4Addr::new(192, 168, c, d)),
            any::<[u8; 3]>().prop_map(|[b, c, d]| Ipv4Addr::new(127, b, c, d)),
            any::<[u8; 2]>().prop_map(|[c, d]| Ipv4Addr::new(169, 254, c, d)),
            (224u8..240, any::<[u8; 3]>()).prop_map(|(a, [b, c, d])| Ipv4Addr::new(a, b, c, d)),
            (240u8..=255, any::<[u8; 3]>()).prop_map(|(a, [b, c, d])| Ipv4Addr::new(a, b, c, d)),
            Just(Ipv4Addr::UNSPECIFIED),
        ]
    }

    proptest! {
        #[test]
        fn prop_unsafe_v4_rejected_only_when_disallowed(ip in unsafe_v4()) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let g = UrlGuard::with_resolver(Arc::new(
                StaticResolver::new().with_host("target.test", [ip.to_string()]),
            ));

            let rejected = rt.block_on(g.check("https://target.test/", &strict()));
            prop_assert!(
                matches!(rejected, Err(GuardError::UnsafeAddress { .. })),
                "expected UnsafeAddress, got {:?}",
                rejected
            );

            let accepted = rt.block_on(g.check("https://target.test/", &lenient()));
            prop_assert!(accepted.is_ok());
        }

        #[test]
        fn prop_mapped_v6_follows_v4(ip in unsafe_v4()) {
            prop_assert!(classify(IpAddr::V6(ip.to_ipv6_mapped())).is_some());
        }

        #[test]
        fn prop_fragment_always_stripped(path in "[a-z]{0,8}", frag in "[a-zA-Z0-9]{0,12}") {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let raw = format!("https://93.184.216.34/{path}#{frag}");
            let target = rt.block_on(guard().check(&raw, &strict())).unwrap();
            prop_assert!(target.url().fragment().is_none());
            prop_assert!(!target.as_str().contains('#'));
        }
    }
}
