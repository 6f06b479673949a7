//! Benchmark utilities.

use rand::Rng;
use std::net::Ipv4Addr;

/// Generates `count` distinct client keys as the rate limiter sees them.
pub fn client_keys(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let i = u32::try_from(i).unwrap_or(u32::MAX);
            Ipv4Addr::from(0x0a00_0000 | (i & 0x00ff_ffff)).to_string()
        })
        .collect()
}

/// Generates a random 32 hex digit token plaintext.
pub fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}
