use crate::domain::entities::entity_schema::EntitySchema;
use crate::domain::entities::field_descriptor::{DataType, FieldDescriptor};
use crate::domain::entities::relationship::Relationship;

/// Role a column plays in the relational export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Primary,
    Foreign,
    None,
}

impl KeyRole {
    fn as_label(&self) -> &'static str {
        match self {
            KeyRole::Primary => "primary",
            KeyRole::Foreign => "foreign",
            KeyRole::None => "none",
        }
    }
}

/// One row of the flat (entity, field) metadata table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatMetadataRow {
    pub entity: String,
    pub field: String,
    pub data_type: String,
    pub required: bool,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub reference_targets: Vec<String>,
    pub relationship_name: Option<String>,
}

/// One row of the relational/diagram table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationalRow {
    Table {
        entity: String,
    },
    Column {
        entity: String,
        field: String,
        sql_type: String,
        column_length: String,
        key_role: KeyRole,
    },
    Relationship {
        from_entity: String,
        from_field: String,
        to_entity: String,
        to_field: String,
        cardinality: String,
    },
}

/// Maps a normalized field type onto the SQL-ish type the diagram import expects
fn sql_type_of(field: &FieldDescriptor) -> (&'static str, &'static str) {
    if field.is_identifier {
        return ("INT", "11");
    }
    match &field.data_type {
        DataType::Reference => ("INT", "11"),
        DataType::Number => ("FLOAT", "18"),
        DataType::Boolean => ("INT", "1"),
        DataType::DateTime => ("DATETIME", ""),
        DataType::Date => ("DATE", ""),
        DataType::String | DataType::TextArea => ("TEXT", ""),
        DataType::Picklist | DataType::Other(_) => ("VARCHAR", "255"),
    }
}

fn key_role_of(field: &FieldDescriptor) -> KeyRole {
    if field.is_identifier {
        KeyRole::Primary
    } else if field.data_type == DataType::Reference {
        KeyRole::Foreign
    } else {
        KeyRole::None
    }
}

/// Entities sorted by name, fields sorted by name within each entity.
///
/// Sorts are stable so ties keep the original fetch order; no map or set
/// iteration is involved anywhere, which is what makes the encoders
/// byte-deterministic.
fn sorted_view(entities: &[EntitySchema]) -> Vec<(&EntitySchema, Vec<&FieldDescriptor>)> {
    let mut view: Vec<&EntitySchema> = entities.iter().collect();
    view.sort_by(|a, b| a.name.cmp(&b.name));

    view.into_iter()
        .map(|entity| {
            let mut fields: Vec<&FieldDescriptor> = entity.fields.iter().collect();
            fields.sort_by(|a, b| a.field_name.cmp(&b.field_name));
            (entity, fields)
        })
        .collect()
}

/// Builds the flat metadata table: one row per (entity, field) pair.
///
/// Not filtered by relationship resolvability: unresolved reference fields
/// keep their row and their declared targets.
pub fn build_flat_rows(entities: &[EntitySchema]) -> Vec<FlatMetadataRow> {
    sorted_view(entities)
        .into_iter()
        .flat_map(|(entity, fields)| {
            fields.into_iter().map(|field| FlatMetadataRow {
                entity: entity.name.clone(),
                field: field.field_name.clone(),
                data_type: field.data_type.as_label().to_string(),
                required: field.is_required,
                length: field.length,
                precision: field.precision,
                scale: field.scale,
                reference_targets: field.reference_targets.clone(),
                relationship_name: field.relationship_name.clone(),
            })
        })
        .collect()
}

/// Builds the relational table: one `Table` row per entity, one `Column` row
/// per field, one `Relationship` row per derived relationship.
pub fn build_relational_rows(
    entities: &[EntitySchema],
    relationships: &[Relationship],
) -> Vec<RelationalRow> {
    let view = sorted_view(entities);

    let mut rows = Vec::new();
    for (entity, _) in &view {
        rows.push(RelationalRow::Table {
            entity: entity.name.clone(),
        });
    }
    for (entity, fields) in &view {
        for field in fields {
            let (sql_type, column_length) = sql_type_of(field);
            rows.push(RelationalRow::Column {
                entity: entity.name.clone(),
                field: field.field_name.clone(),
                sql_type: sql_type.to_string(),
                column_length: column_length.to_string(),
                key_role: key_role_of(field),
            });
        }
    }

    let mut sorted_relationships: Vec<&Relationship> = relationships.iter().collect();
    sorted_relationships.sort_by(|a, b| {
        (&a.from_entity, &a.from_field, &a.to_entity).cmp(&(
            &b.from_entity,
            &b.from_field,
            &b.to_entity,
        ))
    });

    for relationship in sorted_relationships {
        // The referenced column is the target's platform identifier field
        let to_field = entities
            .iter()
            .find(|entity| entity.name == relationship.to_entity)
            .and_then(|entity| entity.identifier_field())
            .map(|field| field.field_name.clone())
            .unwrap_or_else(|| "Id".to_string());

        rows.push(RelationalRow::Relationship {
            from_entity: relationship.from_entity.clone(),
            from_field: relationship.from_field.clone(),
            to_entity: relationship.to_entity.clone(),
            to_field,
            cardinality: relationship.cardinality.as_label().to_string(),
        });
    }

    rows
}

const FLAT_HEADER: &str =
    "Entity,Field,Type,Required,Length,Precision,Scale,ReferenceTo,RelationshipName";
const RELATIONAL_HEADER: &str =
    "Kind,Entity,Field,DataType,ColumnLength,KeyRole,ReferencedEntity,ReferencedField,Cardinality";

/// RFC 4180 quoting: fields containing separators, quotes or newlines are
/// wrapped in double quotes, embedded quotes doubled
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",")
}

fn optional_number(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Serializes the flat metadata table to CSV text.
///
/// Byte-identical output for identical input rows.
pub fn encode_flat_csv(rows: &[FlatMetadataRow]) -> String {
    let mut out = String::from(FLAT_HEADER);
    out.push('\n');

    for row in rows {
        let required = if row.required { "true" } else { "false" };
        let length = optional_number(row.length);
        let precision = optional_number(row.precision);
        let scale = optional_number(row.scale);
        let reference_to = row.reference_targets.join(",");
        let relationship_name = row.relationship_name.clone().unwrap_or_default();

        out.push_str(&csv_line(&[
            &row.entity,
            &row.field,
            &row.data_type,
            required,
            &length,
            &precision,
            &scale,
            &reference_to,
            &relationship_name,
        ]));
        out.push('\n');
    }

    out
}

/// Serializes the relational/diagram table to CSV text
pub fn encode_relational_csv(rows: &[RelationalRow]) -> String {
    let mut out = String::from(RELATIONAL_HEADER);
    out.push('\n');

    for row in rows {
        let line = match row {
            RelationalRow::Table { entity } => {
                csv_line(&["table", entity, "", "", "", "", "", "", ""])
            }
            RelationalRow::Column {
                entity,
                field,
                sql_type,
                column_length,
                key_role,
            } => csv_line(&[
                "column",
                entity,
                field,
                sql_type,
                column_length,
                key_role.as_label(),
                "",
                "",
                "",
            ]),
            RelationalRow::Relationship {
                from_entity,
                from_field,
                to_entity,
                to_field,
                cardinality,
            } => csv_line(&[
                "relationship",
                from_entity,
                from_field,
                "",
                "",
                "",
                to_entity,
                to_field,
                cardinality,
            ]),
        };
        out.push_str(&line);
        out.push('\n');
    }

    out
}
