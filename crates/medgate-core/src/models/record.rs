//! Protected entity payloads exchanged with the storage collaborator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single protected entity (patient, medical record, prescription).
///
/// Fields are kept as a JSON object so the sensitive-field schema can
/// be applied by name without knowing the concrete entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProtectedRecord {
    pub entity_type: String,
    /// Assigned by the store on first write.
    pub id: Option<i64>,
    /// Patient the record belongs to; for `Patient` records this is the
    /// record's own id.
    pub patient_id: Option<i64>,
    pub fields: Map<String, Value>,
}

impl ProtectedRecord {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Default::default()
        }
    }

    pub fn with_patient(mut self, patient_id: i64) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// JSON snapshot used for audit before/after values.
    pub fn snapshot(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Filter for store queries.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub patient_id: Option<i64>,
}
