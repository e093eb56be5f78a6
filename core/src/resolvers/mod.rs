//! Resolvers: narrow, injectable lookup capabilities. The Analyzer treats
//! any failure from any of these as "not resolved" — none of them may
//! raise.

pub(crate) mod blacklist;
mod geoip;
mod reverse_dns;
mod vendor;

pub use blacklist::FileBlacklist;
pub use geoip::{ChainedCountryLookup, HttpFallbackGeoIp, MaxMindGeoIp};
pub use reverse_dns::CachingReverseDns;
pub use vendor::FileVendorLookup;

use async_trait::async_trait;

/// ISO-3166-1 alpha-2 country lookup for an IP address.
#[async_trait]
pub trait CountryLookup: Send + Sync {
    /// Returns the uppercase ISO-α-2 code, or `None` on any miss/failure.
    async fn country(&self, ip: &str) -> Option<String>;
}

/// Reverse-DNS lookup for an IP address.
#[async_trait]
pub trait ReverseDns: Send + Sync {
    /// Returns the lowercased FQDN with no trailing dot, or `None`.
    async fn reverse(&self, ip: &str) -> Option<String>;
}

/// OUI vendor lookup for a MAC address.
pub trait VendorLookup: Send + Sync {
    fn vendor(&self, mac: &str) -> Option<String>;
}

/// Predicate over a blacklist of hostnames.
pub trait BlacklistMembership: Send + Sync {
    fn is_blacklisted(&self, host: &str) -> bool;
}
