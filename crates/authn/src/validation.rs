//! JWT header validation.
//!
//! Checks run on the untrusted header before any key is touched:
//! - Only EdDSA is accepted; symmetric algorithms and `none` are always
//!   rejected, which rules out algorithm-substitution attacks
//! - The `kid` must name the key of the expected credential kind

use crate::{codec::CredentialKind, error::AuthError};

/// JWT algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, would let anyone holding the
///   verification key mint tokens
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms. Only EdDSA (Ed25519) is issued and verified.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["EdDSA"];

/// Validates a JWT `alg` header value.
///
/// # Errors
///
/// Returns [`AuthError::InvalidCredential`] if the algorithm is forbidden or
/// not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use taskhub_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("RS256").is_err());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.iter().any(|f| f.eq_ignore_ascii_case(alg)) {
        return Err(AuthError::invalid_credential("forbidden algorithm"));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::invalid_credential("algorithm not in accepted list"));
    }

    Ok(())
}

/// Validates that a `kid` header names the key for `kind`.
///
/// # Errors
///
/// Returns [`AuthError::InvalidCredential`] if the `kid` is missing or
/// belongs to a different credential kind.
pub fn validate_kid(kid: Option<&str>, kind: CredentialKind, expected: &str) -> Result<(), AuthError> {
    match kid {
        Some(kid) if kid == expected => Ok(()),
        Some(kid) if !kid.starts_with(kind.key_prefix()) => {
            Err(AuthError::invalid_credential("kid belongs to another credential kind"))
        },
        Some(_) => Err(AuthError::invalid_credential("unknown kid")),
        None => Err(AuthError::invalid_credential("missing kid")),
    }
}
