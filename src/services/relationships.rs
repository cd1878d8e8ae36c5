//! Relationship extraction from sentences with recognized entities.
use std::collections::{BTreeMap, HashSet};

use regex::Regex;

use crate::domain::{Relationship, RelationshipKind, SentenceEntities, edge_key, normalize_entity};

/// Evidence sentences kept per relationship.
const MAX_EVIDENCE: usize = 3;

/// Extracts entity relationships from co-occurrence and verb patterns.
pub struct RelationshipExtractor {
    min_relationship_strength: f64,
    patterns: Vec<(Regex, RelationshipKind)>,
}

impl Default for RelationshipExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationshipExtractor {
    pub fn new() -> Self {
        let patterns = [
            (
                r"(?i)(\w+)\s+(?:causes?|induces?|triggers?|leads to|results in)\s+(\w+)",
                RelationshipKind::Causes,
            ),
            (
                r"(?i)(\w+)\s+(?:is caused by|is induced by|is triggered by)\s+(\w+)",
                RelationshipKind::CausedBy,
            ),
            (
                r"(?i)(\w+)\s+(?:inhibits?|blocks?|suppresses?|prevents?)\s+(\w+)",
                RelationshipKind::Inhibits,
            ),
            (
                r"(?i)(\w+)\s+(?:is inhibited by|is blocked by|is suppressed by)\s+(\w+)",
                RelationshipKind::InhibitedBy,
            ),
            (
                r"(?i)(\w+)\s+(?:associates? with|interacts? with|binds? to)\s+(\w+)",
                RelationshipKind::InteractsWith,
            ),
            (
                r"(?i)(\w+)\s+(?:treats?|ameliorates?|reduces?)\s+(\w+)",
                RelationshipKind::Treats,
            ),
            (
                r"(?i)(\w+)\s+(?:expresses?|activates?|upregulates?|downregulates?)\s+(\w+)",
                RelationshipKind::Regulates,
            ),
        ]
        .into_iter()
        .map(|(pattern, kind)| (Regex::new(pattern).expect("static regex"), kind))
        .collect();

        Self {
            min_relationship_strength: 1.0,
            patterns,
        }
    }

    /// Every unordered pair of distinct entities in the same sentence
    /// accrues weight one.
    pub fn extract_cooccurrence(
        &self,
        sentence_entities: &[SentenceEntities],
    ) -> Vec<Relationship> {
        let mut edges: BTreeMap<(String, String), (f64, Vec<String>)> = BTreeMap::new();

        for sent in sentence_entities {
            for (i, first) in sent.entities.iter().enumerate() {
                for second in &sent.entities[i + 1..] {
                    if normalize_entity(&first.text) == normalize_entity(&second.text) {
                        continue;
                    }
                    let key = edge_key(&first.text, &second.text);
                    let entry = edges.entry(key).or_insert_with(|| (0.0, Vec::new()));
                    entry.0 += 1.0;
                    if entry.1.len() < MAX_EVIDENCE {
                        entry.1.push(sent.sentence.clone());
                    }
                }
            }
        }

        edges
            .into_iter()
            .filter(|(_, (weight, _))| *weight >= self.min_relationship_strength)
            .map(|((source, target), (weight, evidence))| Relationship {
                source,
                target,
                weight,
                evidence,
                kind: RelationshipKind::CoOccurrence,
            })
            .collect()
    }

    /// Verb patterns yield typed relationships when either matched term is
    /// a recognized entity in the sentence.
    pub fn extract_patterns(&self, sentence_entities: &[SentenceEntities]) -> Vec<Relationship> {
        let mut relationships = Vec::new();

        for sent in sentence_entities {
            let entity_names: HashSet<String> = sent
                .entities
                .iter()
                .map(|e| normalize_entity(&e.text))
                .collect();

            for (pattern, kind) in &self.patterns {
                for caps in pattern.captures_iter(&sent.sentence) {
                    let (Some(source), Some(target)) = (caps.get(1), caps.get(2)) else {
                        continue;
                    };
                    let source = source.as_str();
                    let target = target.as_str();
                    if entity_names.contains(&normalize_entity(source))
                        || entity_names.contains(&normalize_entity(target))
                    {
                        relationships.push(Relationship {
                            source: source.to_string(),
                            target: target.to_string(),
                            weight: 2.0,
                            evidence: vec![sent.sentence.clone()],
                            kind: *kind,
                        });
                    }
                }
            }
        }

        relationships
    }

    /// Merge both extraction methods: weights add, evidence deduplicates,
    /// semantic types win over plain co-occurrence.
    pub fn merge(
        &self,
        cooccurrence: Vec<Relationship>,
        patterns: Vec<Relationship>,
    ) -> Vec<Relationship> {
        let mut merged: BTreeMap<(String, String), Relationship> = cooccurrence
            .into_iter()
            .map(|rel| (rel.edge_key(), rel))
            .collect();

        for rel in patterns {
            match merged.entry(rel.edge_key()) {
                std::collections::btree_map::Entry::Occupied(mut existing) => {
                    let existing = existing.get_mut();
                    existing.weight += rel.weight;
                    existing.evidence.extend(rel.evidence);
                    existing.kind = rel.kind;
                }
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(rel);
                }
            }
        }

        merged
            .into_values()
            .map(|mut rel| {
                let mut seen = HashSet::new();
                rel.evidence.retain(|s| seen.insert(s.clone()));
                rel.evidence.truncate(MAX_EVIDENCE);
                rel
            })
            .collect()
    }

    pub fn extract_all(&self, sentence_entities: &[SentenceEntities]) -> Vec<Relationship> {
        let cooccurrence = self.extract_cooccurrence(sentence_entities);
        let patterns = self.extract_patterns(sentence_entities);
        self.merge(cooccurrence, patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityType, ExtractedEntity};

    fn sentence(id: usize, text: &str, entities: &[&str]) -> SentenceEntities {
        SentenceEntities {
            sentence_id: id,
            sentence: text.to_string(),
            entities: entities
                .iter()
                .map(|name| ExtractedEntity {
                    text: name.to_string(),
                    entity_type: EntityType::Entity,
                    start: 0,
                    end: name.len(),
                })
                .collect(),
        }
    }

    #[test]
    fn cooccurrence_counts_pairs_per_sentence() {
        let sentences = vec![
            sentence(0, "EGFR and KRAS were mutated.", &["EGFR", "KRAS"]),
            sentence(1, "EGFR and KRAS again.", &["EGFR", "KRAS"]),
        ];
        let rels = RelationshipExtractor::new().extract_cooccurrence(&sentences);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].weight, 2.0);
        assert_eq!(rels[0].evidence.len(), 2);
        assert_eq!(rels[0].kind, RelationshipKind::CoOccurrence);
    }

    #[test]
    fn same_entity_pairs_are_skipped() {
        let sentences = vec![sentence(0, "EGFR and egfr.", &["EGFR", "egfr"])];
        let rels = RelationshipExtractor::new().extract_cooccurrence(&sentences);
        assert!(rels.is_empty());
    }

    #[test]
    fn verb_patterns_yield_typed_relationships() {
        let sentences = vec![sentence(
            0,
            "Gefitinib inhibits EGFR in resistant lines.",
            &["Gefitinib", "EGFR"],
        )];
        let rels = RelationshipExtractor::new().extract_patterns(&sentences);
        assert!(
            rels.iter()
                .any(|r| r.kind == RelationshipKind::Inhibits
                    && r.source == "Gefitinib"
                    && r.target == "EGFR")
        );
    }

    #[test]
    fn merge_prefers_semantic_type_and_adds_weight() {
        let sentences = vec![
            sentence(0, "Gefitinib inhibits EGFR.", &["Gefitinib", "EGFR"]),
            sentence(1, "Gefitinib and EGFR were studied.", &["Gefitinib", "EGFR"]),
        ];
        let extractor = RelationshipExtractor::new();
        let rels = extractor.extract_all(&sentences);

        assert_eq!(rels.len(), 1);
        let rel = &rels[0];
        assert_eq!(rel.kind, RelationshipKind::Inhibits);
        // Two co-occurrences plus the weight-2 pattern hit.
        assert_eq!(rel.weight, 4.0);
        assert!(rel.evidence.len() <= MAX_EVIDENCE);
    }

    #[test]
    fn patterns_require_a_known_entity() {
        let sentences = vec![sentence(0, "Something inhibits nothing.", &["EGFR"])];
        let rels = RelationshipExtractor::new().extract_patterns(&sentences);
        assert!(rels.is_empty());
    }
}
