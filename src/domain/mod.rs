//! Strongly-typed domain structures for the extraction pipeline.
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a processing job.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First segment of the UUID, used for generated project names.
    pub fn short(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a processing job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Biomedical entity categories produced by the recognizer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Entity,
    GeneOrGeneProduct,
    Chemical,
    Disease,
    Organism,
    CellType,
    Tissue,
    Organ,
    Unknown,
}

impl EntityType {
    /// Map a raw recognizer label to a category. Covers the BioNLP
    /// fine-grained label inventory; unmapped labels are rejected.
    pub fn from_label(label: &str) -> Option<Self> {
        let mapped = match label {
            "ENTITY" => Self::Entity,
            "GENE" | "GENE_OR_GENE_PRODUCT" | "PROTEIN" => Self::GeneOrGeneProduct,
            "CHEMICAL" | "SIMPLE_CHEMICAL" | "AMINO_ACID" | "ION" => Self::Chemical,
            "DISEASE" | "CANCER" | "PATHOLOGICAL_FORMATION" => Self::Disease,
            "ORGANISM" => Self::Organism,
            "TISSUE" => Self::Tissue,
            "CELL" | "CELL_TYPE" | "CELL_LINE" => Self::CellType,
            "ORGAN" => Self::Organ,
            "BIOLOGICAL_PROCESS" | "REGULATOR" => Self::Entity,
            _ => return None,
        };
        Some(mapped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "ENTITY",
            Self::GeneOrGeneProduct => "GENE_OR_GENE_PRODUCT",
            Self::Chemical => "CHEMICAL",
            Self::Disease => "DISEASE",
            Self::Organism => "ORGANISM",
            Self::CellType => "CELL_TYPE",
            Self::Tissue => "TISSUE",
            Self::Organ => "ORGAN",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Inverse of [`EntityType::as_str`], tolerant of unknown input.
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "ENTITY" => Self::Entity,
            "GENE_OR_GENE_PRODUCT" => Self::GeneOrGeneProduct,
            "CHEMICAL" => Self::Chemical,
            "DISEASE" => Self::Disease,
            "ORGANISM" => Self::Organism,
            "CELL_TYPE" => Self::CellType,
            "TISSUE" => Self::Tissue,
            "ORGAN" => Self::Organ,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entity mention inside a sentence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
}

/// A sentence together with the entities recognized in it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentenceEntities {
    pub sentence_id: usize,
    pub sentence: String,
    pub entities: Vec<ExtractedEntity>,
}

/// Aggregated view of an entity across all sentences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub original_name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub count: usize,
}

/// Semantic category of an extracted relationship.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    CoOccurrence,
    Causes,
    CausedBy,
    Inhibits,
    InhibitedBy,
    InteractsWith,
    Treats,
    Regulates,
    ClinicalTrialStudies,
    ClinicalTrialTests,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoOccurrence => "CO_OCCURRENCE",
            Self::Causes => "CAUSES",
            Self::CausedBy => "CAUSED_BY",
            Self::Inhibits => "INHIBITS",
            Self::InhibitedBy => "INHIBITED_BY",
            Self::InteractsWith => "INTERACTS_WITH",
            Self::Treats => "TREATS",
            Self::Regulates => "REGULATES",
            Self::ClinicalTrialStudies => "CLINICAL_TRIAL_STUDIES",
            Self::ClinicalTrialTests => "CLINICAL_TRIAL_TESTS",
        }
    }

    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "CAUSES" => Self::Causes,
            "CAUSED_BY" => Self::CausedBy,
            "INHIBITS" => Self::Inhibits,
            "INHIBITED_BY" => Self::InhibitedBy,
            "INTERACTS_WITH" => Self::InteractsWith,
            "TREATS" => Self::Treats,
            "REGULATES" => Self::Regulates,
            "CLINICAL_TRIAL_STUDIES" => Self::ClinicalTrialStudies,
            "CLINICAL_TRIAL_TESTS" => Self::ClinicalTrialTests,
            _ => Self::CoOccurrence,
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A weighted relationship between two entities with supporting evidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub evidence: Vec<String>,
    #[serde(rename = "relationship_type")]
    pub kind: RelationshipKind,
}

impl Relationship {
    /// Canonical unordered key for merging duplicate edges.
    pub fn edge_key(&self) -> (String, String) {
        edge_key(&self.source, &self.target)
    }
}

/// Alphabetically sorted endpoint pair, the canonical identity of an edge.
pub fn edge_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Normalize an entity name for comparison: collapse whitespace, lowercase.
pub fn normalize_entity(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_mapping_covers_fine_grained_labels() {
        assert_eq!(
            EntityType::from_label("SIMPLE_CHEMICAL"),
            Some(EntityType::Chemical)
        );
        assert_eq!(
            EntityType::from_label("CELL_LINE"),
            Some(EntityType::CellType)
        );
        assert_eq!(EntityType::from_label("CANCER"), Some(EntityType::Disease));
        assert_eq!(EntityType::from_label("PERSON"), None);
    }

    #[test]
    fn entity_type_round_trips_through_str() {
        for ty in [
            EntityType::Entity,
            EntityType::GeneOrGeneProduct,
            EntityType::Chemical,
            EntityType::Disease,
            EntityType::CellType,
        ] {
            assert_eq!(EntityType::from_str_lossy(ty.as_str()), ty);
        }
    }

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(normalize_entity("  TGF   Beta "), "tgf beta");
    }

    #[test]
    fn edge_keys_are_order_independent() {
        assert_eq!(edge_key("p53", "EGFR"), edge_key("EGFR", "p53"));
    }

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }
}
