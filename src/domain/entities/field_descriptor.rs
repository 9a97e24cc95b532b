use serde::{Deserialize, Serialize};

use crate::helper::error_chain_fmt;

/// Normalized data type of a schema field.
///
/// Anything the platform reports outside of the known set is kept in `Other`
/// with its raw wire label, so exports can surface it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    String,
    Number,
    Boolean,
    Date,
    DateTime,
    Reference,
    Picklist,
    TextArea,
    Other(String),
}

impl DataType {
    /// The label written in the flat metadata export
    pub fn as_label(&self) -> &str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::DateTime => "datetime",
            DataType::Reference => "reference",
            DataType::Picklist => "picklist",
            DataType::TextArea => "textarea",
            DataType::Other(raw) => raw,
        }
    }

    fn from_raw(raw: &str) -> Self {
        match raw {
            "string" | "url" | "phone" | "email" | "encryptedstring" => DataType::String,
            "int" | "long" | "double" | "currency" | "percent" => DataType::Number,
            "boolean" => DataType::Boolean,
            "date" => DataType::Date,
            "datetime" | "time" => DataType::DateTime,
            "reference" => DataType::Reference,
            "picklist" | "multipicklist" | "combobox" => DataType::Picklist,
            "textarea" => DataType::TextArea,
            other => DataType::Other(other.to_string()),
        }
    }
}

/// Metadata about one field of an entity, as normalized at the fetch boundary.
///
/// Immutable once fetched: the resolver and the encoders only ever read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub entity_name: String,
    pub field_name: String,
    pub data_type: DataType,
    pub is_required: bool,
    /// True for the platform-assigned record identifier field (raw type `id`).
    /// This is a structural fact of the source schema, not a naming heuristic.
    pub is_identifier: bool,
    /// Entity names this field may point to. Empty unless `data_type` is `Reference`.
    pub reference_targets: Vec<String>,
    pub relationship_name: Option<String>,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

/// One field of a describe response, as the platform serializes it.
///
/// The loosely-typed wire shape stops here: everything downstream of the
/// fetch boundary works on [`FieldDescriptor`].
#[derive(Debug, Deserialize)]
pub struct RawFieldDescribe {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub nillable: bool,
    #[serde(default, rename = "referenceTo")]
    pub reference_to: Vec<String>,
    #[serde(default, rename = "relationshipName")]
    pub relationship_name: Option<String>,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
}

impl FieldDescriptor {
    pub fn from_describe(entity_name: &str, raw: RawFieldDescribe) -> Self {
        let is_identifier = raw.field_type == "id";
        // Reference targets only make sense on reference fields;
        // some platforms echo an empty list on every field.
        let reference_targets = if raw.field_type == "reference" {
            raw.reference_to
        } else {
            Vec::new()
        };

        Self {
            entity_name: entity_name.to_string(),
            field_name: raw.name,
            data_type: DataType::from_raw(&raw.field_type),
            // The platform reports nullability; a non-nillable field is required
            is_required: !raw.nillable,
            is_identifier,
            reference_targets,
            relationship_name: raw.relationship_name.filter(|name| !name.is_empty()),
            length: raw.length.filter(|length| *length > 0),
            precision: raw.precision.filter(|precision| *precision > 0),
            scale: raw.scale.filter(|scale| *scale > 0),
        }
    }
}

#[derive(thiserror::Error)]
pub enum FieldDescribeParsingError {
    #[error("Describe response did not represent a valid JSON object: {0}. Data: {1}")]
    InvalidJsonData(serde_json::Error, String),
}

impl std::fmt::Debug for FieldDescribeParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Parses the `fields` array of a describe response into normalized descriptors
pub fn try_parsing_describe(
    entity_name: &str,
    fields: &serde_json::Value,
) -> Result<Vec<FieldDescriptor>, FieldDescribeParsingError> {
    let raw_fields: Vec<RawFieldDescribe> = serde_json::from_value(fields.clone())
        .map_err(|e| FieldDescribeParsingError::InvalidJsonData(e, fields.to_string()))?;

    Ok(raw_fields
        .into_iter()
        .map(|raw| FieldDescriptor::from_describe(entity_name, raw))
        .collect())
}
