use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Missing required field '{0}'")]
    MissingField(String),
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },
    #[error("Update payload contains no known lead fields")]
    EmptyPatch,
}

// --- Lead ID ---
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(String);

impl LeadId {
    pub fn new(id: String) -> Self {
        Self(id)
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<String> for LeadId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
impl From<LeadId> for String {
    fn from(lead_id: LeadId) -> Self {
        lead_id.0
    }
}

/// Fields that must be present (as strings) before a lead may be stored.
pub const REQUIRED_FIELDS: [&str; 2] = ["business_meeting", "business_type"];

/// Fields that may be present; absent means absent, not empty string.
pub const OPTIONAL_FIELDS: [&str; 9] = [
    "contact_person",
    "phone",
    "email",
    "address",
    "latitude",
    "longitude",
    "last_contacted",
    "outcome",
    "notes",
];

// --- Validated Lead (write path) ---

/// A lead that has passed validation and is ready to be persisted.
///
/// Optional fields keep the absent/present distinction: `None` is never
/// serialized, so a field that was never set does not appear in the stored
/// document at all.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Lead {
    pub id: LeadId,
    pub business_meeting: String,
    pub business_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_contacted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Lead {
    /// Validates a raw JSON object into a `Lead`.
    ///
    /// `id` and the fields in `REQUIRED_FIELDS` must be present strings; `id`
    /// must additionally be non-empty since it becomes the document key.
    /// Optional fields may be absent or explicitly `null` (both yield `None`);
    /// an empty string is a legal value and is preserved as `Some("")`.
    /// Fields outside the declared set are ignored.
    pub fn validate(raw: Map<String, Value>) -> Result<Self, DomainError> {
        let id = required_string(&raw, "id")?;
        if id.trim().is_empty() {
            return Err(DomainError::InvalidFieldValue {
                field: "id".to_string(),
                reason: "document id must not be empty".to_string(),
            });
        }
        let business_meeting = required_string(&raw, "business_meeting")?;
        let business_type = required_string(&raw, "business_type")?;

        Ok(Self {
            id: LeadId::new(id),
            business_meeting,
            business_type,
            contact_person: optional_string(&raw, "contact_person")?,
            phone: optional_string(&raw, "phone")?,
            email: optional_string(&raw, "email")?,
            address: optional_string(&raw, "address")?,
            latitude: optional_string(&raw, "latitude")?,
            longitude: optional_string(&raw, "longitude")?,
            last_contacted: optional_string(&raw, "last_contacted")?,
            outcome: optional_string(&raw, "outcome")?,
            notes: optional_string(&raw, "notes")?,
        })
    }

    /// Serializes the lead into the flat field mapping stored as the document
    /// body. Unset optional fields are omitted entirely.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("id".to_string(), Value::String(self.id.as_str().to_owned()));
        payload.insert(
            "business_meeting".to_string(),
            Value::String(self.business_meeting.clone()),
        );
        payload.insert(
            "business_type".to_string(),
            Value::String(self.business_type.clone()),
        );
        let optional = [
            ("contact_person", &self.contact_person),
            ("phone", &self.phone),
            ("email", &self.email),
            ("address", &self.address),
            ("latitude", &self.latitude),
            ("longitude", &self.longitude),
            ("last_contacted", &self.last_contacted),
            ("outcome", &self.outcome),
            ("notes", &self.notes),
        ];
        for (name, value) in optional {
            if let Some(text) = value {
                payload.insert(name.to_string(), Value::String(text.clone()));
            }
        }
        payload
    }
}

// --- Partial Lead (read path) ---

/// A lead as read back from the store, with every field optional.
///
/// Stored documents are deserialized leniently: missing fields stay `None`,
/// non-string values are skipped, unknown fields are ignored. This keeps the
/// read path tolerant of documents written before the current field set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LeadRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_meeting: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_contacted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LeadRecord {
    /// Builds a record from a raw stored payload without rejecting anything.
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_owned)
        };
        Self {
            id: field("id"),
            business_meeting: field("business_meeting"),
            business_type: field("business_type"),
            contact_person: field("contact_person"),
            phone: field("phone"),
            email: field("email"),
            address: field("address"),
            latitude: field("latitude"),
            longitude: field("longitude"),
            last_contacted: field("last_contacted"),
            outcome: field("outcome"),
            notes: field("notes"),
        }
    }
}

// --- Lead Patch (merge-update path) ---

/// A validated partial update: only declared lead fields, each a string.
///
/// Merge writes cannot change the document key, so `id` is dropped if
/// supplied. `null` values are treated as absent; a merge cannot unset a
/// field.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadPatch {
    fields: Map<String, Value>,
}

impl LeadPatch {
    pub fn validate(raw: Map<String, Value>) -> Result<Self, DomainError> {
        let mut fields = Map::new();
        for name in REQUIRED_FIELDS.iter().chain(OPTIONAL_FIELDS.iter()) {
            match raw.get(*name) {
                None | Some(Value::Null) => {}
                Some(Value::String(text)) => {
                    fields.insert((*name).to_string(), Value::String(text.clone()));
                }
                Some(other) => {
                    return Err(DomainError::InvalidFieldValue {
                        field: (*name).to_string(),
                        reason: format!("expected a string, got {:?}", other),
                    });
                }
            }
        }
        if fields.is_empty() {
            return Err(DomainError::EmptyPatch);
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_payload(self) -> Map<String, Value> {
        self.fields
    }
}

fn required_string(raw: &Map<String, Value>, field: &str) -> Result<String, DomainError> {
    match raw.get(field) {
        None | Some(Value::Null) => Err(DomainError::MissingField(field.to_string())),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(DomainError::InvalidFieldValue {
            field: field.to_string(),
            reason: format!("expected a string, got {:?}", other),
        }),
    }
}

fn optional_string(raw: &Map<String, Value>, field: &str) -> Result<Option<String>, DomainError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(DomainError::InvalidFieldValue {
            field: field.to_string(),
            reason: format!("expected a string, got {:?}", other),
        }),
    }
}
