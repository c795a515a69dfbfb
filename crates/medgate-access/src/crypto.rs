//! AES-256-GCM field encryption.
//!
//! Wire format: `base64(nonce[16] || tag[16] || ciphertext[n])`. The
//! 16-byte nonce is kept for compatibility with existing stored values;
//! AES-GCM derives its counter block from nonces longer than 12 bytes
//! through GHASH.

use std::fmt;

use aes_gcm::AesGcm;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use medgate_core::models::record::ProtectedRecord;
use medgate_core::models::schema::SensitiveFieldSchema;
use serde_json::Value;

use crate::error::AccessError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

type FieldCipher = AesGcm<Aes256, U16>;

/// Encrypts and decrypts individual field values.
///
/// Holds only the expanded key, so one instance can be shared across
/// concurrent requests without synchronization.
#[derive(Clone)]
pub struct FieldEncryptionEngine {
    cipher: FieldCipher,
}

impl fmt::Debug for FieldEncryptionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldEncryptionEngine")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl FieldEncryptionEngine {
    /// Build an engine from raw key material. Anything other than
    /// exactly 32 bytes is rejected.
    pub fn new(key: &[u8]) -> Result<Self, AccessError> {
        if key.len() != KEY_LEN {
            return Err(AccessError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        let cipher =
            FieldCipher::new_from_slice(key).map_err(|_| AccessError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            })?;
        Ok(Self { cipher })
    }

    /// Build an engine from a base64-encoded key, as stored in
    /// configuration.
    pub fn from_base64_key(encoded: &str) -> Result<Self, AccessError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(AccessError::KeyMissing);
        }
        let key = STANDARD
            .decode(encoded)
            .map_err(|_| AccessError::KeyEncoding)?;
        Self::new(&key)
    }

    /// Encrypt a field value. The empty string is returned as-is.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AccessError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(nonce, b"", &mut buffer)
            .map_err(|_| AccessError::EncryptFailed)?;

        let mut wire = Vec::with_capacity(NONCE_LEN + TAG_LEN + buffer.len());
        wire.extend_from_slice(&nonce_bytes);
        wire.extend_from_slice(&tag);
        wire.extend_from_slice(&buffer);
        Ok(STANDARD.encode(wire))
    }

    /// Decrypt a wire value. The empty string is returned as-is; any
    /// malformed or unauthenticated input fails without yielding
    /// plaintext.
    pub fn decrypt(&self, wire: &str) -> Result<String, AccessError> {
        if wire.is_empty() {
            return Ok(String::new());
        }

        let bytes = STANDARD
            .decode(wire)
            .map_err(|_| AccessError::DecryptFailed("malformed base64"))?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(AccessError::DecryptFailed("ciphertext too short"));
        }

        let (nonce_bytes, rest) = bytes.split_at(NONCE_LEN);
        let (tag_bytes, ciphertext) = rest.split_at(TAG_LEN);
        let nonce = GenericArray::from_slice(nonce_bytes);
        let tag = GenericArray::from_slice(tag_bytes);

        let mut buffer = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
            .map_err(|_| AccessError::DecryptFailed("authentication tag mismatch"))?;

        String::from_utf8(buffer).map_err(|_| AccessError::DecryptFailed("plaintext is not UTF-8"))
    }

    /// Encrypt every schema-designated field of `record`. Absent and
    /// null fields are left alone.
    pub fn encrypt_fields(
        &self,
        schema: &SensitiveFieldSchema,
        mut record: ProtectedRecord,
    ) -> Result<ProtectedRecord, AccessError> {
        for field in schema.fields_for(&record.entity_type) {
            match record.fields.get_mut(&field.name) {
                None | Some(Value::Null) => {}
                Some(Value::String(value)) => *value = self.encrypt(value)?,
                Some(_) => {
                    return Err(AccessError::NonStringField {
                        field: field.name.clone(),
                    });
                }
            }
        }
        Ok(record)
    }

    /// Decrypt every schema-designated field of `record`. A stored
    /// sensitive field that is not a string is treated as corrupt.
    pub fn decrypt_fields(
        &self,
        schema: &SensitiveFieldSchema,
        mut record: ProtectedRecord,
    ) -> Result<ProtectedRecord, AccessError> {
        for field in schema.fields_for(&record.entity_type) {
            match record.fields.get_mut(&field.name) {
                None | Some(Value::Null) => {}
                Some(Value::String(value)) => *value = self.decrypt(value)?,
                Some(_) => return Err(AccessError::DecryptFailed("stored field is not a string")),
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine() -> FieldEncryptionEngine {
        FieldEncryptionEngine::new(&[42u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let engine = engine();
        for plaintext in ["123-45-6789", "Type 2 Diabetes, A1C 7.2%", "糖尿病 🩺", "x"] {
            let wire = engine.encrypt(plaintext).unwrap();
            assert_ne!(wire, plaintext);
            assert_eq!(engine.decrypt(&wire).unwrap(), plaintext);
        }
    }

    #[test]
    fn wire_layout_is_nonce_tag_ciphertext() {
        let wire = engine().encrypt("diagnosis").unwrap();
        let bytes = STANDARD.decode(wire).unwrap();
        assert_eq!(bytes.len(), NONCE_LEN + TAG_LEN + "diagnosis".len());
    }

    #[test]
    fn empty_string_bypasses_cipher() {
        let engine = engine();
        assert_eq!(engine.encrypt("").unwrap(), "");
        assert_eq!(engine.decrypt("").unwrap(), "");
    }

    #[test]
    fn same_plaintext_never_encrypts_identically() {
        let engine = engine();
        let a = engine.encrypt("123-45-6789").unwrap();
        let b = engine.encrypt("123-45-6789").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_decrypt() {
        let other = FieldEncryptionEngine::new(&[99u8; KEY_LEN]).unwrap();
        let wire = engine().encrypt("secret").unwrap();
        assert!(matches!(
            other.decrypt(&wire),
            Err(AccessError::DecryptFailed(_))
        ));
    }

    #[test]
    fn malformed_inputs_fail_closed() {
        let engine = engine();
        assert!(engine.decrypt("not base64 !!").is_err());
        assert!(engine.decrypt(&STANDARD.encode([0u8; 31])).is_err());
        // Exactly nonce + tag with no ciphertext still needs a valid tag.
        assert!(engine.decrypt(&STANDARD.encode([0u8; 32])).is_err());
    }

    #[test]
    fn key_length_is_enforced() {
        for len in [0, 16, 31, 33, 64] {
            let err = FieldEncryptionEngine::new(&vec![1u8; len]).unwrap_err();
            assert!(matches!(
                err,
                AccessError::InvalidKeyLength { expected: 32, actual } if actual == len
            ));
        }
    }

    #[test]
    fn base64_key_loading() {
        let encoded = STANDARD.encode([7u8; KEY_LEN]);
        assert!(FieldEncryptionEngine::from_base64_key(&encoded).is_ok());
        assert!(matches!(
            FieldEncryptionEngine::from_base64_key("  "),
            Err(AccessError::KeyMissing)
        ));
        assert!(matches!(
            FieldEncryptionEngine::from_base64_key("***"),
            Err(AccessError::KeyEncoding)
        ));
        assert!(matches!(
            FieldEncryptionEngine::from_base64_key(&STANDARD.encode([7u8; 16])),
            Err(AccessError::InvalidKeyLength { actual: 16, .. })
        ));
    }

    #[test]
    fn debug_output_redacts_key() {
        let rendered = format!("{:?}", engine());
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn record_fields_follow_schema() {
        let engine = engine();
        let schema = SensitiveFieldSchema::healthcare_default();
        let record = ProtectedRecord::new("MedicalRecord")
            .with_patient(5)
            .with_field("diagnosis", "Hypertension")
            .with_field("doctor_name", "Dr. Smith")
            .with_field("lab_results", Value::Null);

        let stored = engine.encrypt_fields(&schema, record.clone()).unwrap();
        assert_ne!(stored.field_str("diagnosis"), Some("Hypertension"));
        assert_eq!(stored.field_str("doctor_name"), Some("Dr. Smith"));
        assert_eq!(stored.fields.get("lab_results"), Some(&Value::Null));

        let restored = engine.decrypt_fields(&schema, stored).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn non_string_sensitive_field_is_rejected() {
        let schema = SensitiveFieldSchema::healthcare_default();
        let record = ProtectedRecord::new("MedicalRecord").with_field("diagnosis", 42);
        assert!(matches!(
            engine().encrypt_fields(&schema, record),
            Err(AccessError::NonStringField { .. })
        ));
    }

    proptest! {
        #[test]
        fn roundtrip_any_string(plaintext in any::<String>()) {
            let engine = engine();
            let wire = engine.encrypt(&plaintext).unwrap();
            prop_assert_eq!(engine.decrypt(&wire).unwrap(), plaintext);
        }

        #[test]
        fn any_flipped_byte_is_detected(
            plaintext in "[a-zA-Z0-9 ]{1,64}",
            position in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let engine = engine();
            let wire = engine.encrypt(&plaintext).unwrap();
            let mut bytes = STANDARD.decode(&wire).unwrap();
            let i = position.index(bytes.len());
            bytes[i] ^= mask;
            let tampered = STANDARD.encode(&bytes);
            prop_assert!(engine.decrypt(&tampered).is_err());
        }
    }
}
