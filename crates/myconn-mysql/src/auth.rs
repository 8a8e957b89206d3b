//! MySQL authentication plugins.
//!
//! - `mysql_native_password`: `SHA1(pw) XOR SHA1(seed + SHA1(SHA1(pw)))`
//! - `caching_sha2_password` (fast path):
//!   `SHA256(pw) XOR SHA256(SHA256(SHA256(pw)) + seed)`
//! - `mysql_clear_password`: the password followed by NUL, only when the
//!   caller opted in with `enable_cleartext_plugin`
//!
//! Full `caching_sha2_password` authentication needs TLS or the server's RSA
//! key; this client reports it as an authentication failure instead.

use myconn_core::error::{ConnectionError, ConnectionErrorKind};
use myconn_core::{Error, Result};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Well-known authentication plugin names.
pub mod plugins {
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// Status bytes that follow a `caching_sha2_password` scramble.
pub mod caching_sha2 {
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// Refuse plugins that would put the password on the wire unless allowed.
///
/// The connection is never encrypted, so a server (or anything in between)
/// asking for `mysql_clear_password` would receive the raw password.
pub fn check_plugin(plugin: &str, allow_cleartext: bool) -> Result<()> {
    if plugin == plugins::MYSQL_CLEAR_PASSWORD && !allow_cleartext {
        return Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Authentication,
            message: "Server requested mysql_clear_password over an unencrypted connection; \
                      set enable_cleartext_plugin to allow it"
                .to_string(),
            source: None,
        }));
    }
    Ok(())
}

/// Compute the auth response for `plugin`.
///
/// Callers run [`check_plugin`] first.
///
/// Unknown plugins fall back to `mysql_native_password`, which is what a
/// server expects after it sends an auth-switch to a plugin we don't know.
pub fn scramble(plugin: &str, password: &str, seed: &[u8]) -> Vec<u8> {
    match plugin {
        plugins::CACHING_SHA2_PASSWORD => caching_sha2_password(password, seed),
        plugins::MYSQL_CLEAR_PASSWORD => {
            let mut out = password.as_bytes().to_vec();
            out.push(0);
            out
        }
        _ => mysql_native_password(password, seed),
    }
}

/// `mysql_native_password` scramble. Empty password yields an empty response.
pub fn mysql_native_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = &seed[..seed.len().min(20)];

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);
    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let stage3 = hasher.finalize();

    xor(&stage1, &stage3)
}

/// `caching_sha2_password` fast-auth scramble.
pub fn caching_sha2_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    // Servers send a 20-byte scramble plus a trailing NUL.
    let seed = match seed {
        [head @ .., 0] if head.len() == 20 => head,
        _ => seed,
    };

    let hash1 = Sha256::digest(password.as_bytes());
    let hash2 = Sha256::digest(hash1);
    let mut hasher = Sha256::new();
    hasher.update(hash2);
    hasher.update(seed);
    let hash3 = hasher.finalize();

    xor(&hash1, &hash3)
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}
