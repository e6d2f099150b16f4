//! Shared-secret authentication for calls from other services.
//!
//! Callers send `Authorization: Apikey <secret>`. Used by the payment gateway webhook and by the
//! upload receiver when it registers documents.

/// Scheme in front of the shared secret.
pub const SCHEME: &str = "Apikey";

/// Whether `authorization` is exactly `Apikey <secret>`.
pub fn matches(secret: &str, authorization: Option<&str>) -> bool {
    let Some(presented) = authorization else {
        return false;
    };
    let expected = format!("{SCHEME} {secret}");
    constant_time_eq(presented.as_bytes(), expected.as_bytes())
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
