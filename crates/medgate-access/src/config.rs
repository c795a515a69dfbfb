//! Access mediation configuration.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use medgate_core::models::schema::SensitiveFieldSchema;

use crate::error::AccessError;

/// Environment variable holding the base64-encoded 256-bit field key.
pub const ENV_ENCRYPTION_KEY: &str = "MEDGATE_ENCRYPTION_KEY";
/// Optional path to a JSON sensitive-field schema.
pub const ENV_SCHEMA_PATH: &str = "MEDGATE_SCHEMA_PATH";

/// Configuration for the access mediator.
#[derive(Clone)]
pub struct AccessConfig {
    /// Raw AES-256-GCM key for field encryption. Must be 32 bytes;
    /// anything else fails mediator construction.
    pub encryption_key: Vec<u8>,
    /// Fields encrypted at rest, per entity type.
    pub sensitive_fields: SensitiveFieldSchema,
    /// Entity type -> consent type that must be active before records
    /// of that type are created or updated.
    pub consent_requirements: BTreeMap<String, String>,
}

impl fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessConfig")
            .field("encryption_key", &format_args!("<{} bytes>", self.encryption_key.len()))
            .field("sensitive_fields", &self.sensitive_fields)
            .field("consent_requirements", &self.consent_requirements)
            .finish()
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        let consent_requirements = [("MedicalRecord", "Treatment"), ("Prescription", "Treatment")]
            .into_iter()
            .map(|(entity, consent)| (entity.to_string(), consent.to_string()))
            .collect();

        Self {
            encryption_key: Vec::new(),
            sensitive_fields: SensitiveFieldSchema::healthcare_default(),
            consent_requirements,
        }
    }
}

impl AccessConfig {
    /// Load from `MEDGATE_ENCRYPTION_KEY` (required, base64) and
    /// `MEDGATE_SCHEMA_PATH` (optional; the built-in schema is used
    /// when unset).
    pub fn from_env() -> Result<Self, AccessError> {
        let encoded = std::env::var(ENV_ENCRYPTION_KEY).map_err(|_| AccessError::KeyMissing)?;
        let encryption_key = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AccessError::KeyEncoding)?;

        let sensitive_fields = match std::env::var(ENV_SCHEMA_PATH) {
            Ok(path) => {
                let json = std::fs::read_to_string(&path)
                    .map_err(|e| AccessError::Config(format!("reading {path}: {e}")))?;
                SensitiveFieldSchema::from_json(&json)
                    .map_err(|e| AccessError::Config(e.to_string()))?
            }
            Err(_) => SensitiveFieldSchema::healthcare_default(),
        };

        Ok(Self {
            encryption_key,
            sensitive_fields,
            ..Default::default()
        })
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.encryption_key = key.into();
        self
    }

    /// Consent type required to write records of `entity_type`, if any.
    pub fn required_consent(&self, entity_type: &str) -> Option<&str> {
        self.consent_requirements
            .get(entity_type)
            .map(String::as_str)
    }
}
