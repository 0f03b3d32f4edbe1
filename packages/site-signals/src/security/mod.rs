//! SSRF protection for user-supplied targets.

mod dns;
mod guard;

pub use dns::GuardedDns;
pub use guard::{classify, screen_redirect, AddressClass, Resolver, SystemResolver, UrlGuard};
