//! Ed25519 signing secrets.
//!
//! Access and refresh credentials are signed with two **independent** key
//! pairs, so a credential of one kind can never verify as the other. Each
//! pair carries a key id (`kid`) prefixed with its kind, which is written to
//! the JWT header and checked before any signature work.
//!
//! Private key material is held in PKCS#8 DER form inside [`Zeroizing`]
//! buffers and scrubbed from memory on drop.
//!
//! # Example
//!
//! ```
//! use taskhub_authn::{CredentialKind, keys::SigningSecrets};
//!
//! let secrets = SigningSecrets::generate();
//! assert!(secrets.for_kind(CredentialKind::Access).kid().starts_with("access-"));
//! assert!(secrets.for_kind(CredentialKind::Refresh).kid().starts_with("refresh-"));
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{codec::CredentialKind, error::AuthError};

/// PKCS#8 v1 prefix for a raw 32-byte Ed25519 seed.
const PKCS8_ED25519_PREFIX: [u8; 16] = [
    0x30, 0x2e, // SEQUENCE, 46 bytes
    0x02, 0x01, 0x00, // INTEGER version 0
    0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
    0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
    0x04, 0x22, // OCTET STRING, 34 bytes
    0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
];

/// One Ed25519 key pair dedicated to a single credential kind.
pub struct SigningKeyPair {
    kind: CredentialKind,
    kid: String,
    public_key: String,
    pkcs8_der: Zeroizing<Vec<u8>>,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kind", &self.kind)
            .field("kid", &self.kid)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generates a fresh random key pair for `kind`.
    #[must_use]
    pub fn generate(kind: CredentialKind) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(kind, &signing_key)
    }

    /// Loads a key pair from an Ed25519 PKCS#8 v1 DER document.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the document is not a
    /// 48-byte Ed25519 PKCS#8 v1 key.
    pub fn from_pkcs8_der(kind: CredentialKind, der: &[u8]) -> Result<Self, AuthError> {
        let seed = der
            .strip_prefix(PKCS8_ED25519_PREFIX.as_slice())
            .filter(|seed| seed.len() == 32)
            .ok_or_else(|| AuthError::configuration("expected a 48-byte Ed25519 PKCS#8 v1 key"))?;
        let mut bytes: Zeroizing<[u8; 32]> = Zeroizing::new([0; 32]);
        bytes.copy_from_slice(seed);
        Ok(Self::from_signing_key(kind, &SigningKey::from_bytes(&bytes)))
    }

    /// Loads a key pair from a base64url (unpadded) encoded 32-byte seed,
    /// the form secrets are usually injected through the environment.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the seed is not valid
    /// base64url or not 32 bytes long.
    pub fn from_seed_base64(kind: CredentialKind, seed_b64: &str) -> Result<Self, AuthError> {
        let decoded = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(seed_b64.trim())
                .map_err(|_| AuthError::configuration("signing seed is not base64url"))?,
        );
        let seed: &[u8; 32] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::configuration("signing seed must be 32 bytes"))?;
        Ok(Self::from_signing_key(kind, &SigningKey::from_bytes(seed)))
    }

    fn from_signing_key(kind: CredentialKind, signing_key: &SigningKey) -> Self {
        let public_key_bytes = signing_key.verifying_key().to_bytes();
        let public_key = URL_SAFE_NO_PAD.encode(public_key_bytes);

        let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
        let mut pkcs8_der = Zeroizing::new(PKCS8_ED25519_PREFIX.to_vec());
        pkcs8_der.extend_from_slice(&*private_bytes);

        let fingerprint = Sha256::digest(public_key_bytes);
        let kid = format!("{}{}", kind.key_prefix(), hex::encode(&fingerprint[..8]));

        let encoding = EncodingKey::from_ed_der(&pkcs8_der);
        // Raw 32-byte public key, the same bytes `from_ed_components` decodes.
        let decoding = DecodingKey::from_ed_der(&public_key_bytes);

        Self { kind, kid, public_key, pkcs8_der, encoding, decoding }
    }

    /// Credential kind this pair signs.
    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    /// Key id written to the JWT `kid` header.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public key, base64url without padding.
    #[must_use]
    pub fn public_key_base64(&self) -> &str {
        &self.public_key
    }

    /// Private key as PKCS#8 DER.
    #[must_use]
    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8_der
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// The pair of independent secrets the credential codec signs with.
#[derive(Debug)]
pub struct SigningSecrets {
    access: SigningKeyPair,
    refresh: SigningKeyPair,
}

impl SigningSecrets {
    /// Bundles an access and a refresh key pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if a pair is assigned to the
    /// wrong kind or both kinds share the same key.
    pub fn new(access: SigningKeyPair, refresh: SigningKeyPair) -> Result<Self, AuthError> {
        if access.kind != CredentialKind::Access || refresh.kind != CredentialKind::Refresh {
            return Err(AuthError::configuration("signing key assigned to the wrong credential kind"));
        }
        if access.public_key == refresh.public_key {
            return Err(AuthError::configuration("access and refresh credentials need independent keys"));
        }
        Ok(Self { access, refresh })
    }

    /// Generates two fresh independent key pairs.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            access: SigningKeyPair::generate(CredentialKind::Access),
            refresh: SigningKeyPair::generate(CredentialKind::Refresh),
        }
    }

    /// Returns the key pair for `kind`.
    #[must_use]
    pub fn for_kind(&self, kind: CredentialKind) -> &SigningKeyPair {
        match kind {
            CredentialKind::Access => &self.access,
            CredentialKind::Refresh => &self.refresh,
        }
    }
}
