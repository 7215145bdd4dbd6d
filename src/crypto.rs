//! Cryptographic building blocks for the vault.
//!
//! Design notes:
//!
//! - KDF: Argon2id derives a 32-byte key-encryption-key (KEK) straight from
//!   the master password + per-vault salt. There is no further key
//!   separation step: the KEK's only job is wrapping the DEK (v2) or
//!   encrypting the payload directly (v1 legacy).
//! - Key hierarchy: a randomly generated DEK encrypts the vault payload; the
//!   DEK is wrapped (encrypted) with the KEK.
//! - AEAD: AES-256-GCM provides authenticated encryption (confidentiality +
//!   integrity). Nonces must never repeat for a given key.
//! - AAD: callers pass associated data (the envelope header bytes) to bind
//!   ciphertexts to specific parameters/metadata. Any AAD change must fail
//!   decrypt.
//!
//! Security foot-guns to avoid:
//!
//! - Never reuse a `(key, nonce)` pair with AES-256-GCM.
//! - Do not log or print keys, plaintext payloads, or decrypted secrets.
//! - Treat all returned plaintext bytes as sensitive and keep them in memory
//!   for as short a time as possible.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params as Argon2Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use thiserror::Error;
use zeroize::Zeroizing;

/// Output size (bytes) of Argon2id, and of every KEK/DEK it is bound to.
pub const KEY_LEN: usize = 32;
/// Size (bytes) of the data encryption key (DEK).
pub const DEK_LEN: usize = KEY_LEN;
/// Size (bytes) of AES-256-GCM nonces.
pub const GCM_NONCE_LEN: usize = 12;
/// Size (bytes) of an AES-256-GCM authentication tag.
pub const GCM_TAG_LEN: usize = 16;
/// Size (bytes) of a wrapped DEK (32-byte plaintext + 16-byte tag).
pub const WRAPPED_DEK_LEN: usize = DEK_LEN + GCM_TAG_LEN;

/// Secret bytes held in memory with zeroize-on-drop semantics.
///
/// We prefer `SecretSlice<u8>` (a boxed slice) because it:
/// - can be constructed from a `Vec<u8>` via `From<Vec<u8>>`
/// - ensures the backing memory is zeroized on drop
pub type SecretBytes = SecretSlice<u8>;

/// Argon2id tuning parameters, persisted verbatim in the envelope metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// `spec.md` §3's metadata defaults: 64 MiB, 3 iterations, 4 lanes.
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// A higher-cost preset for operators who want to spend more than the
    /// spec's baseline default on an interactive CLI.
    pub fn recommended_interactive() -> Self {
        Self {
            memory_kib: 256 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }

    /// Cheap parameters for test fixtures; never used on a real vault.
    pub fn for_tests() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn to_argon2_params(self) -> Result<Argon2Params, CryptoError> {
        Ok(Argon2Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )?)
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("password must not be empty")]
    EmptyPassword,

    #[error("invalid nonce length")]
    InvalidNonceLength,

    #[error("argon2 error")]
    Argon2(#[from] argon2::Error),

    #[error("aead authentication failed")]
    Aead,
}

/// Generate `N` cryptographically-secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a fresh per-vault DEK (data encryption key).
pub fn generate_dek() -> SecretBytes {
    SecretBytes::from(random_bytes::<DEK_LEN>().to_vec())
}

/// Derive a 32-byte key-encryption-key from the master password via
/// Argon2id. Rejects a zero-length password (I-level contract, §4.1).
pub fn derive_kek(
    password_bytes: &[u8],
    salt: &[u8],
    params: KdfParams,
) -> Result<SecretBytes, CryptoError> {
    if password_bytes.is_empty() {
        return Err(CryptoError::EmptyPassword);
    }

    let argon2_params = params.to_argon2_params()?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut out = vec![0u8; KEY_LEN];
    argon2.hash_password_into(password_bytes, salt, &mut out)?;
    Ok(SecretBytes::from(out))
}

/// Convenience wrapper for `derive_kek` using a `SecretString`.
pub fn derive_kek_from_password(
    password: &SecretString,
    salt: &[u8],
    params: KdfParams,
) -> Result<SecretBytes, CryptoError> {
    derive_kek(password.expose_secret().as_bytes(), salt, params)
}

/// Seal (encrypt) `plaintext` under `key` with AES-256-GCM.
///
/// `nonce` must be unique for this `key`. `aad` binds the ciphertext to
/// caller-chosen context (typically the envelope header bytes).
pub fn seal(
    key: &SecretBytes,
    nonce: &[u8; GCM_NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(key.expose_secret()).map_err(|_| CryptoError::Aead)?;
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Aead)
}

/// Open (decrypt) `ciphertext` under `key` with AES-256-GCM.
///
/// Returns a single opaque [`CryptoError::Aead`] on any authentication or
/// length failure — callers must never distinguish the two (§4.1, §7).
pub fn open(
    key: &SecretBytes,
    nonce: &[u8; GCM_NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(key.expose_secret()).map_err(|_| CryptoError::Aead)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Aead)?;
    Ok(Zeroizing::new(plaintext))
}

/// Wrap (encrypt) the DEK under a KEK. Thin naming wrapper over [`seal`] so
/// call sites read as key-hierarchy operations rather than generic AEAD.
pub fn wrap_dek(
    kek: &SecretBytes,
    nonce: &[u8; GCM_NONCE_LEN],
    aad: &[u8],
    dek: &SecretBytes,
) -> Result<Vec<u8>, CryptoError> {
    seal(kek, nonce, aad, dek.expose_secret())
}

/// Unwrap (decrypt) the DEK under a KEK.
pub fn unwrap_dek(
    kek: &SecretBytes,
    nonce: &[u8; GCM_NONCE_LEN],
    aad: &[u8],
    wrapped: &[u8],
) -> Result<SecretBytes, CryptoError> {
    let dek = open(kek, nonce, aad, wrapped)?;
    Ok(SecretBytes::from(dek.to_vec()))
}

/// Parse a fixed-size nonce from an arbitrary slice (e.g. a decoded base64
/// field from the envelope).
pub fn nonce_from_slice(bytes: &[u8]) -> Result<[u8; GCM_NONCE_LEN], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidNonceLength)
}

/// Constant-time byte comparison. Returns `false` immediately on length
/// mismatch (length is not secret here; the spec only requires the *value*
/// comparison to be constant-time).
pub fn ct_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Best-effort zeroize of an arbitrary buffer. Exposed for callers holding
/// raw `Vec<u8>`/`String` buffers outside the `SecretBytes`/`Zeroizing`
/// wrappers (e.g. a password read from a prompt before it is boxed).
pub fn zeroize(buf: &mut [u8]) {
    use zeroize::Zeroize;
    buf.zeroize();
}

pub mod mnemonic {
    //! BIP-39 mnemonic encode/decode, English wordlist only (§4.1, §4.3).

    use super::CryptoError;
    use bip39::{Language, Mnemonic};

    /// Entropy length (bytes) for a 24-word mnemonic.
    pub const ENTROPY_LEN: usize = 32;
    /// Word count of a full recovery mnemonic.
    pub const WORD_COUNT: usize = 24;

    pub fn entropy_to_mnemonic(entropy: &[u8; ENTROPY_LEN]) -> Vec<String> {
        let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
            .expect("32 bytes is always valid BIP-39 entropy");
        mnemonic.words().map(str::to_string).collect()
    }

    pub fn mnemonic_to_entropy(words: &[String]) -> Result<[u8; ENTROPY_LEN], CryptoError> {
        let joined = words.join(" ");
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &joined)
            .map_err(|_| CryptoError::Aead)?;
        let entropy = mnemonic.to_entropy();
        entropy
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::Aead)
    }

    pub fn is_valid_word(word: &str) -> bool {
        Language::English.find_word(word).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let salt = random_bytes::<16>();
        let kek = derive_kek(b"correct horse battery staple", &salt, KdfParams::for_tests())
            .unwrap();
        let nonce = random_bytes::<GCM_NONCE_LEN>();
        let aad = b"header-bytes";
        let plaintext = b"hello vault";

        let ct = seal(&kek, &nonce, aad, plaintext).unwrap();
        let pt = open(&kek, &nonce, aad, &ct).unwrap();
        assert_eq!(pt.as_slice(), plaintext);
    }

    #[test]
    fn open_fails_under_wrong_key() {
        let salt = random_bytes::<16>();
        let kek1 = derive_kek(b"password-one", &salt, KdfParams::for_tests()).unwrap();
        let kek2 = derive_kek(b"password-two", &salt, KdfParams::for_tests()).unwrap();
        let nonce = random_bytes::<GCM_NONCE_LEN>();
        let aad = b"header";

        let ct = seal(&kek1, &nonce, aad, b"secret").unwrap();
        let err = open(&kek2, &nonce, aad, &ct).unwrap_err();
        assert!(matches!(err, CryptoError::Aead));
    }

    #[test]
    fn open_fails_on_aad_mismatch() {
        let dek = generate_dek();
        let nonce = random_bytes::<GCM_NONCE_LEN>();
        let ct = seal(&dek, &nonce, b"aad-one", b"payload").unwrap();
        let err = open(&dek, &nonce, b"aad-two", &ct).unwrap_err();
        assert!(matches!(err, CryptoError::Aead));
    }

    #[test]
    fn wrap_unwrap_dek_roundtrip() {
        let salt = random_bytes::<16>();
        let kek = derive_kek(b"master password", &salt, KdfParams::for_tests()).unwrap();
        let dek = generate_dek();
        let nonce = random_bytes::<GCM_NONCE_LEN>();
        let aad = b"header";

        let wrapped = wrap_dek(&kek, &nonce, aad, &dek).unwrap();
        assert_eq!(wrapped.len(), WRAPPED_DEK_LEN);
        let unwrapped = unwrap_dek(&kek, &nonce, aad, &wrapped).unwrap();
        assert_eq!(dek.expose_secret(), unwrapped.expose_secret());
    }

    #[test]
    fn unwrap_dek_fails_on_tamper() {
        let salt = random_bytes::<16>();
        let kek = derive_kek(b"pw", &salt, KdfParams::for_tests()).unwrap();
        let dek = SecretBytes::from(vec![7u8; DEK_LEN]);
        let nonce = random_bytes::<GCM_NONCE_LEN>();
        let aad = b"header";

        let mut wrapped = wrap_dek(&kek, &nonce, aad, &dek).unwrap();
        wrapped[0] ^= 0x01;

        let err = unwrap_dek(&kek, &nonce, aad, &wrapped).unwrap_err();
        assert!(matches!(err, CryptoError::Aead));
    }

    #[test]
    fn derive_kek_rejects_empty_password() {
        let salt = random_bytes::<16>();
        let err = derive_kek(b"", &salt, KdfParams::for_tests()).unwrap_err();
        assert!(matches!(err, CryptoError::EmptyPassword));
    }

    #[test]
    fn ct_equal_matches_and_differs() {
        assert!(ct_equal(b"abcdef", b"abcdef"));
        assert!(!ct_equal(b"abcdef", b"abcxef"));
        assert!(!ct_equal(b"abc", b"abcd"));
    }

    #[test]
    fn mnemonic_roundtrip() {
        let entropy = random_bytes::<{ mnemonic::ENTROPY_LEN }>();
        let words = mnemonic::entropy_to_mnemonic(&entropy);
        assert_eq!(words.len(), mnemonic::WORD_COUNT);
        for w in &words {
            assert!(mnemonic::is_valid_word(w));
        }
        let recovered = mnemonic::mnemonic_to_entropy(&words).unwrap();
        assert_eq!(recovered, entropy);
    }

    #[test]
    fn mnemonic_to_entropy_rejects_bad_words() {
        let words: Vec<String> = (0..24).map(|_| "notaword".to_string()).collect();
        assert!(mnemonic::mnemonic_to_entropy(&words).is_err());
    }
}
