//! Hypothesis generation from graph structure.
//!
//! Two signals are mined: open triads (A-B-C with no A-C edge) suggest an
//! untested direct link, and high-betweenness bridge nodes suggest entities
//! worth deeper study.
use std::collections::BTreeSet;

use crate::domain::normalize_entity;
use crate::dto::Hypothesis;
use crate::services::graph::KnowledgeGraph;

/// Entity names too vague to anchor a hypothesis on.
const GENERIC_ENTITIES: &[&str] = &[
    "cell", "cells", "protein", "proteins", "gene", "genes", "tissue", "disease", "patient",
    "patients", "study", "treatment", "human", "humans",
];

pub struct HypothesisAgent<'a> {
    graph: &'a KnowledgeGraph,
}

impl<'a> HypothesisAgent<'a> {
    pub fn new(graph: &'a KnowledgeGraph) -> Self {
        Self { graph }
    }

    fn is_generic(name: &str) -> bool {
        GENERIC_ENTITIES.contains(&normalize_entity(name).as_str())
    }

    /// Rank open triads: pairs of nodes sharing a neighbor but lacking a
    /// direct edge. Confidence rewards strong paths through low-degree
    /// intermediates and penalizes generic endpoints.
    pub fn indirect_connections(&self, focus: Option<&str>, limit: usize) -> Vec<Hypothesis> {
        let mut out = Vec::new();
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();

        for b in self.graph.node_ids() {
            let neighbors: Vec<&String> = self.graph.neighbors(b).collect();
            if neighbors.len() < 2 {
                continue;
            }
            for (i, a) in neighbors.iter().enumerate() {
                for c in &neighbors[i + 1..] {
                    if self.graph.edge(a, c).is_some() {
                        continue;
                    }
                    if let Some(focus) = focus {
                        let f = normalize_entity(focus);
                        if normalize_entity(a) != f && normalize_entity(c) != f {
                            continue;
                        }
                    }
                    let key = if a < c {
                        ((*a).clone(), (*c).clone())
                    } else {
                        ((*c).clone(), (*a).clone())
                    };
                    if !seen.insert(key) {
                        continue;
                    }

                    let (w_ab, ev_ab, _) = match self.graph.edge(a, b) {
                        Some(edge) => edge,
                        None => continue,
                    };
                    let (w_bc, ev_bc, _) = match self.graph.edge(b, c) {
                        Some(edge) => edge,
                        None => continue,
                    };

                    let degree_b = self.graph.degree(b).max(2) as f64;
                    let mut confidence = 0.5 + ((w_ab + w_bc) / degree_b).min(0.4);
                    if Self::is_generic(a) {
                        confidence -= 0.08;
                    }
                    if Self::is_generic(c) {
                        confidence -= 0.08;
                    }
                    let confidence = confidence.clamp(0.3, 0.9);

                    let mut evidence = Vec::new();
                    if let Some(sentence) = ev_ab.first() {
                        evidence.push(sentence.clone());
                    }
                    if let Some(sentence) = ev_bc.first() {
                        evidence.push(sentence.clone());
                    }

                    out.push(Hypothesis {
                        title: format!("{a} may be directly linked to {c}"),
                        explanation: format!(
                            "{a} and {c} are both connected to {b} but have no direct \
                             relationship in the current graph. The shared intermediate \
                             suggests an untested direct interaction."
                        ),
                        confidence,
                        entities: vec![a.to_string(), b.clone(), c.to_string()],
                        evidence_sentences: evidence,
                        edge_pairs: vec![
                            (a.to_string(), b.clone()),
                            (b.clone(), c.to_string()),
                        ],
                    });
                }
            }
        }

        out.sort_by(|x, y| {
            y.confidence
                .partial_cmp(&x.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| x.title.cmp(&y.title))
        });
        out.truncate(limit);
        out
    }

    /// Rank bridge nodes by betweenness centrality.
    pub fn bridge_nodes(&self, limit: usize) -> Vec<Hypothesis> {
        let centrality = self.graph.betweenness_centrality();
        let mut ranked: Vec<(&String, f64)> = centrality
            .iter()
            .filter(|&(name, &score)| score > 0.0 && !Self::is_generic(name))
            .map(|(name, &score)| (name, score))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.truncate(limit);

        let max_score = ranked.first().map_or(0.0, |&(_, s)| s);
        let min_score = ranked.last().map_or(0.0, |&(_, s)| s);
        let span = (max_score - min_score).max(f64::EPSILON);

        ranked
            .into_iter()
            .map(|(name, score)| {
                let normalized = (score - min_score) / span;
                let evidence: Vec<String> = self
                    .graph
                    .neighbors(name)
                    .filter_map(|neighbor| {
                        self.graph
                            .edge(name, neighbor)
                            .and_then(|(_, ev, _)| ev.first().cloned())
                    })
                    .take(2)
                    .collect();
                Hypothesis {
                    title: format!("{name} acts as a bridge in the network"),
                    explanation: format!(
                        "{name} sits on many shortest paths between other entities \
                         (betweenness {score:.3}). Perturbing it may disrupt several \
                         otherwise unrelated processes."
                    ),
                    confidence: 0.6 + 0.35 * normalized,
                    entities: vec![name.clone()],
                    evidence_sentences: evidence,
                    edge_pairs: Vec::new(),
                }
            })
            .collect()
    }

    /// Combined hypothesis list: mostly open triads, padded with bridges.
    pub fn generate(&self, focus: Option<&str>, max_results: usize) -> Vec<Hypothesis> {
        let max_results = max_results.max(1);
        let triad_budget = ((max_results as f64) * 0.8).ceil() as usize;
        let mut hypotheses = self.indirect_connections(focus, triad_budget);

        if hypotheses.len() < max_results {
            let remaining = max_results - hypotheses.len();
            hypotheses.extend(self.bridge_nodes(remaining));
        }
        hypotheses.truncate(max_results);
        hypotheses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityProfile, EntityType, Relationship, RelationshipKind};
    use std::collections::BTreeMap;

    fn graph(names: &[&str], edges: &[(&str, &str, f64)]) -> KnowledgeGraph {
        let entities: BTreeMap<String, EntityProfile> = names
            .iter()
            .map(|name| {
                (
                    normalize_entity(name),
                    EntityProfile {
                        original_name: name.to_string(),
                        entity_type: EntityType::Entity,
                        count: 1,
                    },
                )
            })
            .collect();
        let relationships: Vec<Relationship> = edges
            .iter()
            .map(|&(a, b, weight)| Relationship {
                source: a.to_string(),
                target: b.to_string(),
                weight,
                evidence: vec![format!("{a} relates to {b}.")],
                kind: RelationshipKind::CoOccurrence,
            })
            .collect();
        KnowledgeGraph::build(&entities, &relationships)
    }

    #[test]
    fn open_triad_yields_hypothesis() {
        let graph = graph(
            &["EGFR", "gefitinib", "lung cancer"],
            &[("gefitinib", "EGFR", 2.0), ("EGFR", "lung cancer", 1.0)],
        );
        let agent = HypothesisAgent::new(&graph);
        let hypotheses = agent.indirect_connections(None, 10);
        assert_eq!(hypotheses.len(), 1);
        let h = &hypotheses[0];
        assert!(h.title.contains("gefitinib") && h.title.contains("lung cancer"));
        assert!(h.entities.contains(&"EGFR".to_string()));
        assert!(h.confidence >= 0.3 && h.confidence <= 0.9);
        assert_eq!(h.edge_pairs.len(), 2);
    }

    #[test]
    fn closed_triangle_yields_nothing() {
        let graph = graph(
            &["a1", "b1", "c1"],
            &[("a1", "b1", 1.0), ("b1", "c1", 1.0), ("a1", "c1", 1.0)],
        );
        let agent = HypothesisAgent::new(&graph);
        assert!(agent.indirect_connections(None, 10).is_empty());
    }

    #[test]
    fn focus_restricts_endpoints() {
        let graph = graph(
            &["EGFR", "gefitinib", "lung cancer", "KRAS"],
            &[
                ("gefitinib", "EGFR", 1.0),
                ("EGFR", "lung cancer", 1.0),
                ("EGFR", "KRAS", 1.0),
            ],
        );
        let agent = HypothesisAgent::new(&graph);
        let focused = agent.indirect_connections(Some("KRAS"), 10);
        assert!(!focused.is_empty());
        assert!(
            focused
                .iter()
                .all(|h| h.entities.contains(&"KRAS".to_string()))
        );
    }

    #[test]
    fn generic_endpoints_lose_confidence() {
        let specific = graph(
            &["EGFR", "hub1", "KRAS"],
            &[("EGFR", "hub1", 1.0), ("hub1", "KRAS", 1.0)],
        );
        let generic = graph(
            &["cells", "hub1", "protein"],
            &[("cells", "hub1", 1.0), ("hub1", "protein", 1.0)],
        );
        let a = HypothesisAgent::new(&specific).indirect_connections(None, 1);
        let b = HypothesisAgent::new(&generic).indirect_connections(None, 1);
        assert!(a[0].confidence > b[0].confidence);
    }

    #[test]
    fn bridge_nodes_rank_path_centers() {
        let graph = graph(
            &["w", "x", "y", "z"],
            &[("w", "x", 1.0), ("x", "y", 1.0), ("y", "z", 1.0)],
        );
        let agent = HypothesisAgent::new(&graph);
        let bridges = agent.bridge_nodes(10);
        assert_eq!(bridges.len(), 2);
        assert!(bridges[0].title.contains('x') || bridges[0].title.contains('y'));
        assert!(bridges.iter().all(|h| h.confidence >= 0.6));
    }

    #[test]
    fn generate_pads_with_bridges() {
        let graph = graph(
            &["w", "x", "y", "z"],
            &[("w", "x", 1.0), ("x", "y", 1.0), ("y", "z", 1.0)],
        );
        let agent = HypothesisAgent::new(&graph);
        let all = agent.generate(None, 8);
        assert!(!all.is_empty());
        assert!(all.iter().any(|h| h.edge_pairs.is_empty()));
        assert!(all.iter().any(|h| !h.edge_pairs.is_empty()));
    }
}
