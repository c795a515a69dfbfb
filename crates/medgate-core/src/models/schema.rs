//! Data-driven table of fields that must be encrypted at rest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MedgateError, MedgateResult};

pub const DEFAULT_ALGORITHM: &str = "AES-256-GCM";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Classification {
    #[default]
    Phi,
    Pii,
    Sensitive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensitiveField {
    pub name: String,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

fn default_algorithm() -> String {
    DEFAULT_ALGORITHM.into()
}

impl SensitiveField {
    pub fn new(name: impl Into<String>, classification: Classification) -> Self {
        Self {
            name: name.into(),
            classification,
            algorithm: default_algorithm(),
        }
    }
}

/// Entity type -> ordered list of sensitive fields.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct SensitiveFieldSchema {
    entities: BTreeMap<String, Vec<SensitiveField>>,
}

impl SensitiveFieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sensitive fields of an entity type, replacing any
    /// earlier registration. Duplicate names keep their first position.
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        fields: impl IntoIterator<Item = SensitiveField>,
    ) -> Self {
        let mut ordered: Vec<SensitiveField> = Vec::new();
        for field in fields {
            if !ordered.iter().any(|f| f.name == field.name) {
                ordered.push(field);
            }
        }
        self.entities.insert(entity_type.into(), ordered);
        self
    }

    /// Parse a JSON object of the form
    /// `{"Patient": [{"name": "diagnosis", "classification": "Phi"}]}`.
    pub fn from_json(json: &str) -> MedgateResult<Self> {
        let parsed: Self = serde_json::from_str(json).map_err(|e| MedgateError::Validation {
            message: format!("invalid sensitive-field schema: {e}"),
        })?;
        // Re-run through the builder so duplicate names are collapsed.
        let schema = parsed
            .entities
            .into_iter()
            .fold(Self::new(), |schema, (entity, fields)| {
                schema.with_entity(entity, fields)
            });
        schema.validate()?;
        Ok(schema)
    }

    /// Reject fields naming an algorithm other than [`DEFAULT_ALGORITHM`],
    /// the only one the field encryption engine implements.
    pub fn validate(&self) -> MedgateResult<()> {
        for (entity, fields) in &self.entities {
            if let Some(field) = fields.iter().find(|f| f.algorithm != DEFAULT_ALGORITHM) {
                return Err(MedgateError::Validation {
                    message: format!(
                        "{entity}.{}: unsupported algorithm {}, expected {DEFAULT_ALGORITHM}",
                        field.name, field.algorithm
                    ),
                });
            }
        }
        Ok(())
    }

    /// Built-in table for the clinical entities handled by the service.
    pub fn healthcare_default() -> Self {
        use Classification::{Phi, Pii};

        Self::new()
            .with_entity(
                "Patient",
                [
                    SensitiveField::new("social_security_number", Pii),
                    SensitiveField::new("medical_record_number", Phi),
                    SensitiveField::new("diagnosis", Phi),
                    SensitiveField::new("treatment_notes", Phi),
                    SensitiveField::new("insurance_policy_number", Pii),
                ],
            )
            .with_entity(
                "MedicalRecord",
                [
                    SensitiveField::new("chief_complaint", Phi),
                    SensitiveField::new("symptoms", Phi),
                    SensitiveField::new("diagnosis", Phi),
                    SensitiveField::new("prescription", Phi),
                    SensitiveField::new("lab_results", Phi),
                ],
            )
            .with_entity(
                "Prescription",
                [
                    SensitiveField::new("drug_name", Phi),
                    SensitiveField::new("dosage", Phi),
                    SensitiveField::new("frequency", Phi),
                ],
            )
    }

    /// Sensitive fields of an entity type; empty for unknown types.
    pub fn fields_for(&self, entity_type: &str) -> &[SensitiveField] {
        self.entities
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_sensitive(&self, entity_type: &str, field: &str) -> bool {
        self.fields_for(entity_type).iter().any(|f| f.name == field)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}
