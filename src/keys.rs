//! Random key generation for subscriptions and events.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random key of `len` characters drawn from `[A-Za-z0-9]`.
pub fn generate_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
