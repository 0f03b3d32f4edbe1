//! DNS for the HTTP client, screened by the same rules as the guard.
//!
//! Every name the client resolves (the target and any redirect hop) goes
//! through here. The target's own host is answered with the address the
//! guard already classified; any other name is resolved, reduced to one
//! address and classified before a connection is made.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::debug;

use super::guard::{pick_address, screen_address, Resolver};
use crate::types::{NormalizedUrl, TargetPolicy};

/// A `reqwest` resolver that refuses unsafe addresses.
#[derive(Clone)]
pub struct GuardedDns {
    resolver: Arc<dyn Resolver>,
    policy: Arc<TargetPolicy>,
    pinned: Option<(String, IpAddr)>,
}

impl std::fmt::Debug for GuardedDns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedDns")
            .field("pinned", &self.pinned)
            .finish_non_exhaustive()
    }
}

impl GuardedDns {
    pub fn new(resolver: Arc<dyn Resolver>, policy: &TargetPolicy) -> Self {
        Self {
            resolver,
            policy: Arc::new(policy.clone()),
            pinned: None,
        }
    }

    /// Answer the target's host with the address the guard checked.
    pub fn pinned_to(mut self, target: &NormalizedUrl) -> Self {
        self.pinned = Some((target.host().to_ascii_lowercase(), target.resolved_ip()));
        self
    }

    /// Resolve `host` to the single address a connection may use.
    pub async fn lookup(&self, host: &str) -> Result<IpAddr, String> {
        let host = host.to_ascii_lowercase();
        if let Some((pinned_host, ip)) = &self.pinned {
            if *pinned_host == host {
                return Ok(*ip);
            }
        }

        let addrs = self
            .resolver
            .resolve(&host, 0)
            .await
            .map_err(|e| format!("could not resolve {host}: {e}"))?;
        let ip = pick_address(&addrs).ok_or_else(|| format!("no addresses for {host}"))?;
        screen_address(&host, ip, &self.policy).map_err(|e| e.to_string())?;

        debug!(host = %host, ip = %ip, "hop address accepted");
        Ok(ip)
    }
}

impl Resolve for GuardedDns {
    fn resolve(&self, name: Name) -> Resolving {
        let dns = self.clone();
        Box::pin(async move {
            let ip = dns.lookup(name.as_str()).await?;
            // Port 0 is replaced with the URL's port by the connector
            let addrs: Addrs = Box::new(std::iter::once(SocketAddr::new(ip, 0)));
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::UrlGuard;
    use crate::testing::StaticResolver;

    fn resolver() -> Arc<dyn Resolver> {
        Arc::new(
            StaticResolver::new()
                .with_host("acme.test", ["93.184.216.34"])
                .with_host("intranet.test", ["10.0.0.7"])
                .with_host("mixed.test", ["2606:2800:220:1::", "192.168.1.1"]),
        )
    }

    #[tokio::test]
    async fn test_public_hop_accepted() {
        let dns = GuardedDns::new(resolver(), &TargetPolicy::default());
        assert_eq!(dns.lookup("ACME.test").await.unwrap().to_string(), "93.184.216.34");
    }

    #[tokio::test]
    async fn test_private_hop_refused() {
        let dns = GuardedDns::new(resolver(), &TargetPolicy::default());

        let err = dns.lookup("intranet.test").await.unwrap_err();
        assert!(err.contains("10.0.0.7"), "{err}");

        // IPv4 is preferred, and it is the one that gets classified
        assert!(dns.lookup("mixed.test").await.is_err());
        assert!(dns.lookup("unknown.test").await.is_err());
    }

    #[tokio::test]
    async fn test_private_hop_allowed_when_policy_permits() {
        let policy = TargetPolicy::default().with_private_ips_disallowed(false);
        let dns = GuardedDns::new(resolver(), &policy);
        assert_eq!(dns.lookup("intranet.test").await.unwrap().to_string(), "10.0.0.7");
    }

    #[tokio::test]
    async fn test_target_host_answered_from_pin() {
        let lenient = TargetPolicy::default().with_private_ips_disallowed(false);
        let target = UrlGuard::with_resolver(resolver())
            .check("http://intranet.test/", &lenient)
            .await
            .unwrap();

        // A resolver that no longer knows the name cannot change the answer
        let dns = GuardedDns::new(Arc::new(StaticResolver::new()), &lenient).pinned_to(&target);
        assert_eq!(dns.lookup("intranet.test").await.unwrap().to_string(), "10.0.0.7");
    }
}
