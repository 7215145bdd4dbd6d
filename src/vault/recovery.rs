//! BIP-39 recovery scheme (`spec.md` §4.3): issuing a 24-word mnemonic at
//! initialize, sealing it behind a 6-word challenge, and recovering the DEK
//! from the challenge words (+ optional passphrase) later.
//!
//! This module composes [`crate::crypto`]'s seal/open/wrap primitives twice
//! — once under a key derived from the 6 challenge words, once under a key
//! derived from all 24 — it introduces no new cryptographic primitive of
//! its own.

use rand::seq::SliceRandom;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::crypto::{self, CryptoError, KdfParams, SecretBytes};
use crate::vault::envelope::{
    RecoveryMetadata, CHALLENGE_WORD_COUNT, RECOVERY_SALT_LEN, STORED_WORD_COUNT,
};

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("one or more challenge words are not valid BIP-39 words")]
    InvalidChallengeWord,

    #[error("challenge words did not unlock the vault")]
    WrongChallenge,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Freshly generated recovery material for a vault being initialized with
/// recovery enabled. `mnemonic_words` must be shown to the operator exactly
/// once and never persisted in plaintext.
pub struct NewRecovery {
    pub mnemonic_words: Vec<String>,
    pub metadata: RecoveryMetadata,
}

/// Generate a fresh 24-word mnemonic, seal it behind a random 6-word
/// challenge subset, and seal the DEK behind the full mnemonic (+ optional
/// passphrase). Called once, at `initialize` time.
pub fn setup_recovery(
    dek: &SecretBytes,
    passphrase: Option<&SecretString>,
    params: KdfParams,
) -> Result<NewRecovery, RecoveryError> {
    let entropy = crypto::random_bytes::<{ crypto::mnemonic::ENTROPY_LEN }>();
    let words = crypto::mnemonic::entropy_to_mnemonic(&entropy);

    let mut positions: Vec<u8> = (0..crypto::mnemonic::WORD_COUNT as u8).collect();
    positions.shuffle(&mut OsRng);
    let mut challenge_positions: Vec<u8> = positions[..CHALLENGE_WORD_COUNT].to_vec();
    challenge_positions.sort_unstable();
    let challenge_positions: [u8; CHALLENGE_WORD_COUNT] = challenge_positions
        .try_into()
        .expect("exactly CHALLENGE_WORD_COUNT positions");

    let (challenge_words, stored_words) = split_words(&words, &challenge_positions);

    let salt_challenge = crypto::random_bytes::<RECOVERY_SALT_LEN>();
    let salt_recovery = crypto::random_bytes::<RECOVERY_SALT_LEN>();
    let nonce_stored = crypto::random_bytes::<{ crypto::GCM_NONCE_LEN }>();
    let nonce_recovery = crypto::random_bytes::<{ crypto::GCM_NONCE_LEN }>();

    let k_challenge = derive_k_challenge(&challenge_words, &salt_challenge, params)?;
    let stored_plaintext = stored_words.join(" ");
    let encrypted_stored_words = crypto::seal(
        &k_challenge,
        &nonce_stored,
        recovery_aad(&challenge_positions),
        stored_plaintext.as_bytes(),
    )?;

    let passphrase_required = passphrase.is_some();
    let k_recovery = derive_k_recovery(&words, passphrase, &salt_recovery, params)?;
    let encrypted_recovery_key = crypto::wrap_dek(
        &k_recovery,
        &nonce_recovery,
        recovery_aad(&challenge_positions),
        dek,
    )?;

    Ok(NewRecovery {
        mnemonic_words: words,
        metadata: RecoveryMetadata {
            passphrase_required,
            challenge_positions,
            encrypted_stored_words,
            nonce_stored,
            encrypted_recovery_key,
            nonce_recovery,
            kdf_params: params,
            salt_challenge,
            salt_recovery,
        },
    })
}

/// Recover the DEK from the 6 challenge words (and passphrase, if the
/// recovery was set up to require one). Implements the five-step procedure
/// in `spec.md` §4.3.
pub fn recover_dek(
    metadata: &RecoveryMetadata,
    challenge_words: &[String; CHALLENGE_WORD_COUNT],
    passphrase: Option<&SecretString>,
) -> Result<SecretBytes, RecoveryError> {
    // Step 1: every supplied word must be a real BIP-39 word.
    for word in challenge_words {
        if !crypto::mnemonic::is_valid_word(word) {
            return Err(RecoveryError::InvalidChallengeWord);
        }
    }

    // Step 2: derive K_challenge, open the stored words.
    let k_challenge = derive_k_challenge(challenge_words, &metadata.salt_challenge, metadata.kdf_params)?;
    let stored_plaintext = crypto::open(
        &k_challenge,
        &metadata.nonce_stored,
        recovery_aad(&metadata.challenge_positions),
        &metadata.encrypted_stored_words,
    )
    .map_err(|_| RecoveryError::WrongChallenge)?;
    let stored_words: Vec<String> = std::str::from_utf8(&stored_plaintext)
        .map_err(|_| RecoveryError::WrongChallenge)?
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if stored_words.len() != STORED_WORD_COUNT {
        return Err(RecoveryError::WrongChallenge);
    }

    // Step 3: splice challenge + stored words back into the 24-slot array.
    let full_words = splice_words(challenge_words, &stored_words, &metadata.challenge_positions);

    // Step 4: derive K_recovery, open the recovery-wrapped DEK.
    let k_recovery =
        derive_k_recovery(&full_words, passphrase, &metadata.salt_recovery, metadata.kdf_params)?;
    let dek = crypto::unwrap_dek(
        &k_recovery,
        &metadata.nonce_recovery,
        recovery_aad(&metadata.challenge_positions),
        &metadata.encrypted_recovery_key,
    )
    .map_err(|_| RecoveryError::WrongChallenge)?;

    // Step 5.
    Ok(dek)
}

fn derive_k_challenge(
    challenge_words: &[String],
    salt_challenge: &[u8],
    params: KdfParams,
) -> Result<SecretBytes, CryptoError> {
    let joined = challenge_words.join(" ");
    crypto::derive_kek(joined.as_bytes(), salt_challenge, params)
}

fn derive_k_recovery(
    all_24_words: &[String],
    passphrase: Option<&SecretString>,
    salt_recovery: &[u8],
    params: KdfParams,
) -> Result<SecretBytes, CryptoError> {
    let joined = all_24_words.join(" ");
    let mut material = match passphrase {
        None => joined.into_bytes(),
        Some(p) => {
            let mut m = joined.into_bytes();
            m.push(0u8);
            m.extend_from_slice(p.expose_secret().as_bytes());
            m
        }
    };
    let out = crypto::derive_kek(&material, salt_recovery, params);
    crypto::zeroize(&mut material);
    out
}

/// Recovery ciphertexts are bound (via AAD) to the challenge-position set
/// they were sealed under, so tampering with `challenge_positions` — which
/// is stored in plaintext — invalidates both sealed blobs.
fn recovery_aad(challenge_positions: &[u8; CHALLENGE_WORD_COUNT]) -> &[u8] {
    // `challenge_positions` lives in the caller's `RecoveryMetadata`/local
    // array, so a `&[u8]` borrow of it is as long-lived as the caller needs.
    challenge_positions
}

fn split_words(
    words: &[String],
    challenge_positions: &[u8; CHALLENGE_WORD_COUNT],
) -> (Vec<String>, Vec<String>) {
    let mut challenge = Vec::with_capacity(CHALLENGE_WORD_COUNT);
    let mut stored = Vec::with_capacity(STORED_WORD_COUNT);
    for (i, word) in words.iter().enumerate() {
        if challenge_positions.contains(&(i as u8)) {
            challenge.push(word.clone());
        } else {
            stored.push(word.clone());
        }
    }
    (challenge, stored)
}

fn splice_words(
    challenge_words: &[String; CHALLENGE_WORD_COUNT],
    stored_words: &[String],
    challenge_positions: &[u8; CHALLENGE_WORD_COUNT],
) -> Vec<String> {
    let mut full = vec![String::new(); crypto::mnemonic::WORD_COUNT];
    let mut challenge_iter = challenge_words.iter();
    let mut stored_iter = stored_words.iter();
    for (i, slot) in full.iter_mut().enumerate() {
        if challenge_positions.contains(&(i as u8)) {
            *slot = challenge_iter.next().expect("one word per position").clone();
        } else {
            *slot = stored_iter.next().expect("one word per non-position").clone();
        }
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pw(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn setup_and_recover_roundtrip_without_passphrase() {
        let dek = crypto::generate_dek();
        let params = KdfParams::for_tests();
        let setup = setup_recovery(&dek, None, params).unwrap();

        let challenge_words: [String; CHALLENGE_WORD_COUNT] = setup
            .metadata
            .challenge_positions
            .iter()
            .map(|&pos| setup.mnemonic_words[pos as usize].clone())
            .collect::<Vec<_>>()
            .try_into()
            .unwrap();

        let recovered = recover_dek(&setup.metadata, &challenge_words, None).unwrap();
        assert_eq!(recovered.expose_secret(), dek.expose_secret());
    }

    #[test]
    fn setup_and_recover_roundtrip_with_passphrase() {
        let dek = crypto::generate_dek();
        let params = KdfParams::for_tests();
        let passphrase = pw("extra words");
        let setup = setup_recovery(&dek, Some(&passphrase), params).unwrap();
        assert!(setup.metadata.passphrase_required);

        let challenge_words: [String; CHALLENGE_WORD_COUNT] = setup
            .metadata
            .challenge_positions
            .iter()
            .map(|&pos| setup.mnemonic_words[pos as usize].clone())
            .collect::<Vec<_>>()
            .try_into()
            .unwrap();

        let recovered = recover_dek(&setup.metadata, &challenge_words, Some(&passphrase)).unwrap();
        assert_eq!(recovered.expose_secret(), dek.expose_secret());

        let err = recover_dek(&setup.metadata, &challenge_words, None).unwrap_err();
        assert!(matches!(err, RecoveryError::WrongChallenge));
    }

    #[test]
    fn recover_rejects_non_bip39_word() {
        let dek = crypto::generate_dek();
        let params = KdfParams::for_tests();
        let setup = setup_recovery(&dek, None, params).unwrap();

        let mut bogus = setup.metadata.challenge_positions.map(|pos| setup.mnemonic_words[pos as usize].clone());
        bogus[0] = "notabip39word".to_string();

        let err = recover_dek(&setup.metadata, &bogus, None).unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidChallengeWord));
    }

    #[test]
    fn recover_rejects_wrong_challenge_words() {
        let dek = crypto::generate_dek();
        let params = KdfParams::for_tests();
        let setup = setup_recovery(&dek, None, params).unwrap();

        // Valid BIP-39 words, but not the right ones for this vault.
        let wrong = ["abandon", "ability", "able", "about", "above", "absent"]
            .map(|w| w.to_string());

        let err = recover_dek(&setup.metadata, &wrong, None).unwrap_err();
        assert!(matches!(err, RecoveryError::WrongChallenge));
    }
}
