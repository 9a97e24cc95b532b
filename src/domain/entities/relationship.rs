use serde::{Deserialize, Serialize};

/// Cardinality of a derived relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// A single-target reference: many records of `from_entity` point to one
    /// record of `to_entity`.
    OneToMany,
    /// Reverse orientation of `OneToMany`; not derived by the resolver but part
    /// of the cardinality vocabulary consumers may round-trip.
    ManyToOne,
    /// One candidate target of a polymorphic reference; optional by nature.
    Lookup,
    /// The field points back into its own entity.
    SelfReference,
}

impl Cardinality {
    pub fn as_label(&self) -> &'static str {
        match self {
            Cardinality::OneToMany => "one-to-many",
            Cardinality::ManyToOne => "many-to-one",
            Cardinality::Lookup => "lookup",
            Cardinality::SelfReference => "self-reference",
        }
    }
}

/// A foreign-key style edge derived from a reference field.
///
/// Never fetched and never persisted on its own: relationships are
/// regenerated from their source fields on every export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_entity: String,
    pub from_field: String,
    pub to_entity: String,
    pub cardinality: Cardinality,
}
