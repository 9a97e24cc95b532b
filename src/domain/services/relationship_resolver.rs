use std::collections::HashSet;

use crate::domain::entities::entity_schema::EntitySchema;
use crate::domain::entities::field_descriptor::DataType;
use crate::domain::entities::relationship::{Cardinality, Relationship};

/// A reference field whose target entity is not part of the extracted set.
///
/// Not an error: the relationship is omitted, the field itself stays in the
/// flat export, and the orchestrator logs a warning line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub from_entity: String,
    pub from_field: String,
    pub missing_target: String,
}

/// Output of relationship resolution over one extracted entity set
#[derive(Debug, Default)]
pub struct ResolvedSchema {
    pub relationships: Vec<Relationship>,
    pub unresolved_references: Vec<UnresolvedReference>,
}

/// Derives the relationship set from reference-type fields.
///
/// Rules, in order:
/// - only targets present in `entities` produce a relationship; absent targets
///   (filtered out by namespace for example) are reported as unresolved;
/// - a field pointing back into its own entity is a self-reference;
/// - a polymorphic reference (several declared targets) produces one
///   relationship per viable target, marked as an optional lookup;
/// - a plain single-target reference is one-to-many.
///
/// Deterministic: relationships come out in entity order, then field order,
/// then target order, exactly as fetched.
pub fn resolve_relationships(entities: &[EntitySchema]) -> ResolvedSchema {
    let known_entities: HashSet<&str> = entities.iter().map(|entity| entity.name.as_str()).collect();

    let mut resolved = ResolvedSchema::default();

    for entity in entities {
        for field in &entity.fields {
            if field.data_type != DataType::Reference {
                continue;
            }

            let viable_targets: Vec<&String> = field
                .reference_targets
                .iter()
                .filter(|target| known_entities.contains(target.as_str()))
                .collect();

            for target in &field.reference_targets {
                if !known_entities.contains(target.as_str()) {
                    resolved.unresolved_references.push(UnresolvedReference {
                        from_entity: entity.name.clone(),
                        from_field: field.field_name.clone(),
                        missing_target: target.clone(),
                    });
                }
            }

            // Polymorphism is a property of the field's declaration: a
            // multi-target field stays a lookup even when filtering leaves
            // a single viable target
            let polymorphic = field.reference_targets.len() > 1;

            for target in viable_targets {
                let cardinality = if *target == entity.name {
                    Cardinality::SelfReference
                } else if polymorphic {
                    Cardinality::Lookup
                } else {
                    Cardinality::OneToMany
                };

                resolved.relationships.push(Relationship {
                    from_entity: entity.name.clone(),
                    from_field: field.field_name.clone(),
                    to_entity: target.clone(),
                    cardinality,
                });
            }
        }
    }

    resolved
}
