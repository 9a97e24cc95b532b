use serde::{Deserialize, Serialize};

use super::field_descriptor::FieldDescriptor;

/// One entity (object/table) of the source schema, with its fetched fields.
///
/// Fields keep the order the platform returned them in; field names are
/// unique within an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    pub namespace_prefix: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        let name = name.into();
        let namespace_prefix = namespace_prefix_of(&name);
        Self {
            name,
            namespace_prefix,
            fields,
        }
    }

    /// The platform-assigned identifier field, if the describe contained one.
    ///
    /// There is at most one: the platform marks exactly one field per entity
    /// with the identifier wire type.
    pub fn identifier_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.is_identifier)
    }

    /// Whether the entity name carries the given namespace prefix (`{namespace}__...`)
    pub fn in_namespace(&self, namespace: &str) -> bool {
        entity_in_namespace(&self.name, namespace)
    }
}

/// Namespace filter semantics shared by discovery and exports:
/// a non-empty namespace keeps only names starting with `{namespace}__`.
pub fn entity_in_namespace(entity_name: &str, namespace: &str) -> bool {
    entity_name.starts_with(&format!("{}__", namespace))
}

fn namespace_prefix_of(name: &str) -> Option<String> {
    // `ns__Object__c` style names: the first `__` separates the namespace
    let (prefix, rest) = name.split_once("__")?;
    // A trailing `__c`/`__r` marker alone is not a namespace
    if prefix.is_empty() || rest.is_empty() || rest == "c" || rest == "r" {
        return None;
    }
    Some(prefix.to_string())
}
