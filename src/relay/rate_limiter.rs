use std::{
    hash::{Hash, Hasher},
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    num::NonZeroU32,
};

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorRateLimiter};

/**
 * Rate limiting key. A client usually gets either one IPv4 address
 * OR a /64 IPv6 network, so IPv6 clients are keyed by their first 64 bits.
 */
#[derive(Clone, Debug, Eq, PartialEq)]
enum RateLimitingKey {
    Ipv4(Ipv4Addr),
    IpV6 { network: u64 },
}

impl RateLimitingKey {
    fn from_ipv6(ip: Ipv6Addr) -> Self {
        let network = (ip.to_bits() >> 64) as u64;
        Self::IpV6 { network }
    }
}

impl From<IpAddr> for RateLimitingKey {
    fn from(value: IpAddr) -> Self {
        match value {
            IpAddr::V4(val) => Self::Ipv4(val),
            IpAddr::V6(val) => Self::from_ipv6(val),
        }
    }
}

impl Hash for RateLimitingKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            RateLimitingKey::Ipv4(ipv4_addr) => {
                0_u8.hash(state); // Keeps the IPv4 and IPv6 key spaces apart.
                ipv4_addr.hash(state);
            }
            RateLimitingKey::IpV6 { network } => {
                1_u8.hash(state);
                network.hash(state);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RateLimiterBuilder {
    max_per_second: u32,
    burst_size: u32,
}

impl RateLimiterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries per second a single client may send. 0 disables the limiter.
    pub fn max_per_second(mut self, limit: u32) -> Self {
        self.max_per_second = limit;
        self
    }

    /// Bucket size. 0 uses the per second limit as burst.
    pub fn burst_size(mut self, size: u32) -> Self {
        self.burst_size = size;
        self
    }

    pub fn build(self) -> RateLimiter {
        let max_per_second = match NonZeroU32::new(self.max_per_second) {
            Some(value) => value,
            None => return RateLimiter { limiter: None },
        };

        let mut quota = Quota::per_second(max_per_second);
        if let Some(burst) = NonZeroU32::new(self.burst_size) {
            quota = quota.allow_burst(burst);
        }

        RateLimiter {
            limiter: Some(GovernorRateLimiter::keyed(quota)),
        }
    }
}

/// Per client IP query rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    limiter: Option<DefaultKeyedRateLimiter<RateLimitingKey>>,
}

impl RateLimiter {
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /**
     * Checks if this IP address is limited. Counts the query.
     */
    pub fn check_is_limited_and_increase(&self, ip: &IpAddr) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check_key(&(*ip).into()).is_err(),
            None => false,
        }
    }
}
