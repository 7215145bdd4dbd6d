//! Key hierarchy operations (`spec.md` §4.3): v1 single-KEK legacy unlock,
//! v2 DEK/KEK-wrap unlock, password change, and v1→v2 migration.
//!
//! Recovery (the BIP-39 challenge/stored-word split) lives in
//! [`crate::vault::recovery`]; this module only holds the DEK/KEK wrap-and-
//! rewrap plumbing that recovery, unlock, and password change all share.

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::crypto::{self, CryptoError, KdfParams, SecretBytes};
use crate::vault::envelope::{self, Envelope, Metadata, VERSION_V1, VERSION_V2};

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("wrong password")]
    WrongPassword,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Unlock a v1 (legacy, single-KEK) envelope: the KEK decrypts `data`
/// directly. Any failure collapses to [`KeyError::WrongPassword`] (§4.3,
/// §7 — crypto failures never distinguish their cause).
pub fn unlock_v1(
    envelope: &Envelope,
    password: &SecretString,
) -> Result<Vec<u8>, KeyError> {
    let kek = crypto::derive_kek_from_password(
        password,
        &envelope.metadata.salt,
        envelope.metadata.argon_params,
    )
    .map_err(|_| KeyError::WrongPassword)?;

    let aad = envelope::aad_bytes(&envelope.metadata);
    let plaintext = crypto::open(&kek, &envelope.metadata.nonce, &aad, &envelope.data)
        .map_err(|_| KeyError::WrongPassword)?;
    Ok(plaintext.to_vec())
}

/// Unlock a v2 envelope: unwrap the DEK under the password-derived KEK,
/// then decrypt `data` under the DEK. The KEK itself is dropped (and
/// zeroized) as soon as the DEK is recovered.
pub fn unlock_v2(
    envelope: &Envelope,
    password: &SecretString,
) -> Result<(SecretBytes, Vec<u8>), KeyError> {
    let wrapped_dek = envelope
        .metadata
        .wrapped_dek
        .as_ref()
        .ok_or(KeyError::WrongPassword)?;
    let wrapped_dek_nonce = envelope
        .metadata
        .wrapped_dek_nonce
        .ok_or(KeyError::WrongPassword)?;

    let kek = crypto::derive_kek_from_password(
        password,
        &envelope.metadata.salt,
        envelope.metadata.argon_params,
    )
    .map_err(|_| KeyError::WrongPassword)?;

    let aad = envelope::aad_bytes(&envelope.metadata);
    let dek = crypto::unwrap_dek(&kek, &wrapped_dek_nonce, &aad, wrapped_dek)
        .map_err(|_| KeyError::WrongPassword)?;
    // `kek` goes out of scope here and is zeroized on drop (`SecretBytes`).

    let data_aad = envelope::aad_bytes(&envelope.metadata);
    let plaintext = crypto::open(&dek, &envelope.metadata.nonce, &data_aad, &envelope.data)
        .map_err(|_| KeyError::WrongPassword)?;

    Ok((dek, plaintext.to_vec()))
}

/// Dispatch unlock by envelope version, returning the DEK (for v1, a DEK is
/// synthesized so callers have a uniform in-memory key regardless of
/// on-disk scheme — it is never persisted for a v1 vault).
pub fn unlock(
    envelope: &Envelope,
    password: &SecretString,
) -> Result<(SecretBytes, Vec<u8>), KeyError> {
    match envelope.metadata.version {
        VERSION_V1 => {
            let plaintext = unlock_v1(envelope, password)?;
            Ok((crypto::generate_dek(), plaintext))
        }
        VERSION_V2 => unlock_v2(envelope, password),
        other => {
            let _ = other;
            Err(KeyError::WrongPassword)
        }
    }
}

/// Build a fresh v2 envelope for a brand-new vault: generate the DEK,
/// derive the KEK, seal `plaintext` under the DEK, wrap the DEK under the
/// KEK. `recovery` is threaded through unchanged (recovery setup happens in
/// [`crate::vault::recovery`] before this is called).
pub fn seal_new_v2(
    password: &SecretString,
    params: KdfParams,
    plaintext: &[u8],
    recovery: Option<envelope::RecoveryMetadata>,
) -> Result<(Envelope, SecretBytes), KeyError> {
    seal_new_v2_with_dek(password, params, plaintext, crypto::generate_dek(), recovery)
}

/// Same as [`seal_new_v2`], but with a caller-supplied DEK. Used when
/// recovery setup must seal the same DEK it later wraps under the
/// password-derived KEK (`spec.md` §4.3 initialize-with-recovery ordering).
pub fn seal_new_v2_with_dek(
    password: &SecretString,
    params: KdfParams,
    plaintext: &[u8],
    dek: SecretBytes,
    recovery: Option<envelope::RecoveryMetadata>,
) -> Result<(Envelope, SecretBytes), KeyError> {
    let salt = crypto::random_bytes::<{ envelope::SALT_LEN }>();
    let nonce = crypto::random_bytes::<{ crypto::GCM_NONCE_LEN }>();
    let wrapped_dek_nonce = crypto::random_bytes::<{ crypto::GCM_NONCE_LEN }>();

    let kek = crypto::derive_kek_from_password(password, &salt, params)?;

    let mut metadata = Metadata {
        version: VERSION_V2,
        salt,
        nonce,
        argon_params: params,
        wrapped_dek: None,
        wrapped_dek_nonce: Some(wrapped_dek_nonce),
        recovery,
    };

    let aad = envelope::aad_bytes(&metadata);
    let data = crypto::seal(&dek, &nonce, &aad, plaintext)?;

    // The wrapped DEK is itself bound (via AAD) to the final metadata, so
    // it must be sealed after every other metadata field is fixed.
    let wrapped_dek = crypto::wrap_dek(&kek, &wrapped_dek_nonce, &aad, &dek)?;
    metadata.wrapped_dek = Some(wrapped_dek);

    Ok((Envelope { metadata, data }, dek))
}

/// Re-encrypt `plaintext` under the current DEK, for any in-place mutation
/// of the vault's credential set (add/update/delete, telemetry writes).
/// The DEK, its wrap, and any recovery metadata are untouched — only the
/// payload nonce and ciphertext change.
pub fn reseal(
    envelope: &Envelope,
    dek: &SecretBytes,
    plaintext: &[u8],
) -> Result<Envelope, KeyError> {
    let mut metadata = envelope.metadata.clone();
    metadata.nonce = crypto::random_bytes::<{ crypto::GCM_NONCE_LEN }>();

    let aad = envelope::aad_bytes(&metadata);
    let data = crypto::seal(dek, &metadata.nonce, &aad, plaintext)?;
    Ok(Envelope { metadata, data })
}

/// Password change (v2, §4.3): derive a new KEK under a fresh salt and
/// nonce, re-wrap the existing DEK. `data` and any `recovery` sub-object
/// are untouched.
pub fn change_password_v2(
    envelope: &Envelope,
    dek: &SecretBytes,
    new_password: &SecretString,
    params: KdfParams,
) -> Result<Envelope, KeyError> {
    let mut metadata = envelope.metadata.clone();
    metadata.salt = crypto::random_bytes::<{ envelope::SALT_LEN }>();
    metadata.argon_params = params;
    metadata.wrapped_dek_nonce = Some(crypto::random_bytes::<{ crypto::GCM_NONCE_LEN }>());

    let kek = crypto::derive_kek_from_password(new_password, &metadata.salt, params)?;
    let aad = envelope::aad_bytes(&metadata);
    let wrapped_dek_nonce = metadata
        .wrapped_dek_nonce
        .expect("just set above");
    let wrapped_dek = crypto::wrap_dek(&kek, &wrapped_dek_nonce, &aad, dek)?;
    metadata.wrapped_dek = Some(wrapped_dek);

    Ok(Envelope {
        metadata,
        data: envelope.data.clone(),
    })
}

/// Migrate a v1 envelope to v2 (§4.3): unlock under the current password,
/// generate a fresh DEK, re-encrypt the plaintext under it, wrap the DEK
/// under a freshly derived KEK. Never performed implicitly.
pub fn migrate_v1_to_v2(
    v1_envelope: &Envelope,
    password: &SecretString,
    params: KdfParams,
) -> Result<(Envelope, SecretBytes), KeyError> {
    let plaintext = unlock_v1(v1_envelope, password)?;
    seal_new_v2(password, params, &plaintext, None)
}

/// True when `password` meets the minimum-length policy (§4.4, §7:
/// `WeakPassword` below 12 characters). Exposed here (rather than only at
/// the service layer) so recovery's mandatory post-recovery password
/// change can apply the same rule.
pub fn is_strong_enough(password: &SecretString) -> bool {
    password.expose_secret().chars().count() >= 12
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pw(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn v2_unlock_roundtrip() {
        let (envelope, dek) =
            seal_new_v2(&pw("correct horse battery staple"), KdfParams::for_tests(), b"{}", None)
                .unwrap();
        let (unlocked_dek, plaintext) = unlock_v2(&envelope, &pw("correct horse battery staple")).unwrap();
        assert_eq!(unlocked_dek.expose_secret(), dek.expose_secret());
        assert_eq!(plaintext, b"{}");
    }

    #[test]
    fn v2_unlock_wrong_password_is_opaque() {
        let (envelope, _dek) =
            seal_new_v2(&pw("correct horse battery staple"), KdfParams::for_tests(), b"{}", None)
                .unwrap();
        let err = unlock_v2(&envelope, &pw("wrong password entirely")).unwrap_err();
        assert!(matches!(err, KeyError::WrongPassword));
    }

    #[test]
    fn reseal_preserves_dek_and_wrap() {
        let (envelope, dek) =
            seal_new_v2(&pw("correct horse battery staple"), KdfParams::for_tests(), b"{}", None)
                .unwrap();
        let resealed = reseal(&envelope, &dek, br#"{"a":1}"#).unwrap();
        assert_eq!(resealed.metadata.wrapped_dek, envelope.metadata.wrapped_dek);
        let (_, plaintext) = unlock_v2(&resealed, &pw("correct horse battery staple")).unwrap();
        assert_eq!(plaintext, br#"{"a":1}"#);
    }

    #[test]
    fn change_password_preserves_dek_and_data() {
        let (envelope, dek) =
            seal_new_v2(&pw("correct horse battery staple"), KdfParams::for_tests(), b"payload-bytes", None)
                .unwrap();
        let changed =
            change_password_v2(&envelope, &dek, &pw("a brand new password"), KdfParams::for_tests())
                .unwrap();

        assert!(unlock_v2(&changed, &pw("correct horse battery staple")).is_err());
        let (new_dek, plaintext) = unlock_v2(&changed, &pw("a brand new password")).unwrap();
        assert_eq!(new_dek.expose_secret(), dek.expose_secret());
        assert_eq!(plaintext, b"payload-bytes");
    }

    #[test]
    fn migrate_v1_to_v2_preserves_plaintext() {
        let salt = crypto::random_bytes::<{ envelope::SALT_LEN }>();
        let nonce = crypto::random_bytes::<{ crypto::GCM_NONCE_LEN }>();
        let params = KdfParams::for_tests();
        let kek = crypto::derive_kek_from_password(&pw("legacy password"), &salt, params).unwrap();
        let metadata = Metadata {
            version: VERSION_V1,
            salt,
            nonce,
            argon_params: params,
            wrapped_dek: None,
            wrapped_dek_nonce: None,
            recovery: None,
        };
        let aad = envelope::aad_bytes(&metadata);
        let data = crypto::seal(&kek, &nonce, &aad, b"legacy-plaintext").unwrap();
        let v1 = Envelope { metadata, data };

        let (v2, _dek) = migrate_v1_to_v2(&v1, &pw("legacy password"), params).unwrap();
        assert_eq!(v2.metadata.version, VERSION_V2);
        let (_, plaintext) = unlock_v2(&v2, &pw("legacy password")).unwrap();
        assert_eq!(plaintext, b"legacy-plaintext");
    }

    #[test]
    fn weak_password_policy() {
        assert!(!is_strong_enough(&pw("short")));
        assert!(is_strong_enough(&pw("twelvecharsok")));
    }
}
