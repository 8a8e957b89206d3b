//! Heuristic classification of "lost connection" failures.
//!
//! Drivers report a dropped socket in many different words. A failure whose
//! message contains one of [`LOST_CONNECTION_SIGNATURES`] (case-insensitive)
//! is treated as transient: the caller may reconnect once and carry on.

/// Message fragments that identify a lost or dead connection.
pub const LOST_CONNECTION_SIGNATURES: &[&str] = &[
    "server has gone away",
    "no connection to the server",
    "Lost connection",
    "is dead or not enabled",
    "Error while sending",
    "decryption failed or bad record mac",
    "server closed the connection unexpectedly",
    "SSL connection has been closed unexpectedly",
    "Error writing data to the connection",
    "Resource deadlock avoided",
    "failed with errno",
];

/// Check whether `message` carries a lost-connection signature.
pub fn is_lost_connection(message: &str) -> bool {
    let haystack = message.to_lowercase();
    LOST_CONNECTION_SIGNATURES
        .iter()
        .any(|needle| haystack.contains(&needle.to_lowercase()))
}
