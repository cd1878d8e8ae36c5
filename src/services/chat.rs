//! Conversational agent answering questions over a knowledge graph.
use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::{RelationshipKind, normalize_entity};
use crate::dto::ChatResponse;
use crate::services::graph::KnowledgeGraph;
use crate::services::llm::LlmClient;

/// One prior exchange supplied by the client.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// A traversed edge reported back to the client.
#[derive(Clone, Debug, Serialize)]
pub struct TraversedEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub relationship_type: RelationshipKind,
    pub evidence: Vec<String>,
}

/// Tool-style query surface over a built graph.
pub struct GraphAgent<'a> {
    graph: &'a KnowledgeGraph,
}

impl<'a> GraphAgent<'a> {
    pub fn new(graph: &'a KnowledgeGraph) -> Self {
        Self { graph }
    }

    /// Edges reachable from `entity` within `depth` hops, grouped by layer.
    pub fn neighbors(&self, entity: &str, depth: usize) -> Vec<Vec<TraversedEdge>> {
        if !self.graph.contains(entity) {
            return Vec::new();
        }
        let mut visited: BTreeSet<String> = BTreeSet::from([entity.to_string()]);
        let mut frontier: BTreeSet<String> = visited.clone();
        let mut layers = Vec::new();

        for _ in 0..depth.max(1) {
            let mut next_frontier = BTreeSet::new();
            let mut layer = Vec::new();
            for node in &frontier {
                for neighbor in self.graph.neighbors(node) {
                    if visited.contains(neighbor) {
                        continue;
                    }
                    visited.insert(neighbor.clone());
                    next_frontier.insert(neighbor.clone());
                    layer.push(self.edge_detail(node, neighbor));
                }
            }
            layers.push(layer);
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }
        layers
    }

    /// All shortest paths (by hop count) between two nodes, at most
    /// `k_paths` of them, each with its edge details.
    pub fn shortest_paths(
        &self,
        source: &str,
        target: &str,
        k_paths: usize,
    ) -> Vec<(Vec<String>, Vec<TraversedEdge>)> {
        if !self.graph.contains(source) || !self.graph.contains(target) {
            return Vec::new();
        }
        if source == target {
            return vec![(vec![source.to_string()], Vec::new())];
        }

        // BFS recording every shortest-path predecessor.
        let mut dist: HashMap<String, usize> = HashMap::from([(source.to_string(), 0)]);
        let mut preds: HashMap<String, Vec<String>> = HashMap::new();
        let mut queue = VecDeque::from([source.to_string()]);
        while let Some(node) = queue.pop_front() {
            let d = dist[&node];
            for neighbor in self.graph.neighbors(&node) {
                match dist.get(neighbor) {
                    None => {
                        dist.insert(neighbor.clone(), d + 1);
                        preds.entry(neighbor.clone()).or_default().push(node.clone());
                        queue.push_back(neighbor.clone());
                    }
                    Some(&existing) if existing == d + 1 => {
                        preds.entry(neighbor.clone()).or_default().push(node.clone());
                    }
                    Some(_) => {}
                }
            }
        }
        if !dist.contains_key(target) {
            return Vec::new();
        }

        let mut paths = Vec::new();
        let mut stack = vec![vec![target.to_string()]];
        while let Some(partial) = stack.pop() {
            if paths.len() >= k_paths.max(1) {
                break;
            }
            let Some(head) = partial.last() else {
                continue;
            };
            if head == source {
                let nodes: Vec<String> = partial.iter().rev().cloned().collect();
                let edges = nodes
                    .windows(2)
                    .map(|pair| self.edge_detail(&pair[0], &pair[1]))
                    .collect();
                paths.push((nodes, edges));
                continue;
            }
            if let Some(parents) = preds.get(head) {
                let mut parents = parents.clone();
                parents.sort();
                for parent in parents {
                    let mut extended = partial.clone();
                    extended.push(parent);
                    stack.push(extended);
                }
            }
        }
        paths
    }

    /// Nodes adjacent to every listed entity, ordered by degree.
    pub fn common_connections(&self, entities: &[String], min_degree: usize) -> Vec<(String, usize)> {
        let present: Vec<&String> = entities
            .iter()
            .filter(|e| self.graph.contains(e))
            .collect();
        if present.len() < 2 {
            return Vec::new();
        }

        let mut common: BTreeSet<String> = self.graph.neighbors(present[0]).cloned().collect();
        for entity in &present[1..] {
            let neighbors: BTreeSet<String> = self.graph.neighbors(entity).cloned().collect();
            common = common.intersection(&neighbors).cloned().collect();
        }

        let mut result: Vec<(String, usize)> = common
            .into_iter()
            .map(|node| {
                let degree = self.graph.degree(&node);
                (node, degree)
            })
            .filter(|&(_, degree)| degree >= min_degree)
            .collect();
        result.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        result
    }

    fn edge_detail(&self, a: &str, b: &str) -> TraversedEdge {
        let (weight, evidence, kind) = self
            .graph
            .edge(a, b)
            .unwrap_or((1.0, &[], RelationshipKind::CoOccurrence));
        TraversedEdge {
            source: a.to_string(),
            target: b.to_string(),
            weight,
            relationship_type: kind,
            evidence: evidence.iter().take(3).cloned().collect(),
        }
    }

    /// Entities from the graph mentioned in the message, in node order.
    fn resolve_mentions(&self, message: &str) -> Vec<String> {
        let normalized = format!(" {} ", normalize_entity(message));
        self.graph
            .node_ids()
            .filter(|id| {
                let needle = normalize_entity(id);
                !needle.is_empty() && normalized.contains(&needle)
            })
            .cloned()
            .collect()
    }

    /// Deterministic question answering; when the LLM client is active the
    /// gathered graph context is rephrased by it instead.
    pub async fn chat(
        &self,
        message: &str,
        _history: &[ChatTurn],
        llm: &LlmClient,
    ) -> ChatResponse {
        let mentions = self.resolve_mentions(message);
        let lower = message.to_lowercase();

        let mut response = if mentions.len() >= 2
            && (lower.contains("path") || lower.contains("connect") || lower.contains("link"))
        {
            self.answer_path(&mentions[0], &mentions[1])
        } else if mentions.len() >= 2 && lower.contains("common") {
            self.answer_common(&mentions)
        } else if !mentions.is_empty() {
            self.answer_neighbors(&mentions[0])
        } else {
            self.answer_overview()
        };

        if llm.active() {
            let context = format!(
                "Question: {message}\nGraph findings: {}\nCitations: {}",
                response.answer,
                response.citations.join(" | ")
            );
            if let Some(rephrased) = llm.answer(&context).await {
                response.answer = rephrased;
                response.tool_calls.push("llm_rephrase".to_string());
            }
        }
        response
    }

    fn answer_path(&self, source: &str, target: &str) -> ChatResponse {
        let paths = self.shortest_paths(source, target, 1);
        match paths.first() {
            Some((nodes, edges)) => {
                let citations: Vec<String> = edges
                    .iter()
                    .filter_map(|e| e.evidence.first().cloned())
                    .collect();
                ChatResponse {
                    answer: format!(
                        "{source} connects to {target} through: {}.",
                        nodes.join(" -> ")
                    ),
                    citations,
                    relevant_nodes: nodes.clone(),
                    relevant_edges: edges
                        .iter()
                        .map(|e| (e.source.clone(), e.target.clone()))
                        .collect(),
                    tool_calls: vec!["shortest_path".to_string()],
                }
            }
            None => ChatResponse {
                answer: format!("No path between {source} and {target} in this graph."),
                tool_calls: vec!["shortest_path".to_string()],
                ..Default::default()
            },
        }
    }

    fn answer_common(&self, mentions: &[String]) -> ChatResponse {
        let common = self.common_connections(mentions, 1);
        let answer = if common.is_empty() {
            format!("{} share no common connections.", mentions.join(" and "))
        } else {
            let names: Vec<&str> = common.iter().map(|(n, _)| n.as_str()).take(5).collect();
            format!(
                "{} are both connected to: {}.",
                mentions.join(" and "),
                names.join(", ")
            )
        };
        ChatResponse {
            answer,
            relevant_nodes: common.into_iter().map(|(n, _)| n).collect(),
            tool_calls: vec!["common_connections".to_string()],
            ..Default::default()
        }
    }

    fn answer_neighbors(&self, entity: &str) -> ChatResponse {
        let layers = self.neighbors(entity, 1);
        let edges: Vec<&TraversedEdge> = layers.iter().flatten().collect();
        let answer = if edges.is_empty() {
            format!("{entity} has no recorded relationships.")
        } else {
            let described: Vec<String> = edges
                .iter()
                .take(5)
                .map(|e| format!("{} ({})", e.target, e.relationship_type.as_str()))
                .collect();
            format!("{entity} is related to: {}.", described.join(", "))
        };
        ChatResponse {
            answer,
            citations: edges
                .iter()
                .filter_map(|e| e.evidence.first().cloned())
                .take(5)
                .collect(),
            relevant_nodes: edges.iter().map(|e| e.target.clone()).collect(),
            relevant_edges: edges
                .iter()
                .map(|e| (e.source.clone(), e.target.clone()))
                .collect(),
            tool_calls: vec!["get_neighbors".to_string()],
        }
    }

    fn answer_overview(&self) -> ChatResponse {
        let mut hubs: Vec<(String, usize)> = self
            .graph
            .node_ids()
            .map(|id| (id.clone(), self.graph.degree(id)))
            .collect();
        hubs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hubs.truncate(5);

        let answer = if hubs.is_empty() {
            "The graph is empty; process some documents first.".to_string()
        } else {
            let names: Vec<String> = hubs
                .iter()
                .map(|(n, d)| format!("{n} ({d} connections)"))
                .collect();
            format!("The most connected entities are: {}.", names.join(", "))
        };
        ChatResponse {
            answer,
            relevant_nodes: hubs.into_iter().map(|(n, _)| n).collect(),
            tool_calls: vec!["top_hubs".to_string()],
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityProfile, EntityType, Relationship};
    use std::collections::BTreeMap;

    fn graph() -> KnowledgeGraph {
        let entities: BTreeMap<String, EntityProfile> = ["EGFR", "gefitinib", "lung cancer", "KRAS"]
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
        let relationships = vec![
            Relationship {
                source: "EGFR".into(),
                target: "gefitinib".into(),
                weight: 2.0,
                evidence: vec!["Gefitinib inhibits EGFR.".into()],
                kind: RelationshipKind::Inhibits,
            },
            Relationship {
                source: "EGFR".into(),
                target: "lung cancer".into(),
                weight: 1.0,
                evidence: vec!["EGFR drives lung cancer.".into()],
                kind: RelationshipKind::CoOccurrence,
            },
        ];
        KnowledgeGraph::build(&entities, &relationships)
    }

    #[test]
    fn neighbors_expand_by_layer() {
        let graph = graph();
        let agent = GraphAgent::new(&graph);
        let layers = agent.neighbors("gefitinib", 2);
        assert_eq!(layers[0].len(), 1);
        assert_eq!(layers[0][0].target, "EGFR");
        assert_eq!(layers[1].len(), 1);
        assert_eq!(layers[1][0].target, "lung cancer");
    }

    #[test]
    fn shortest_path_traverses_bridge() {
        let graph = graph();
        let agent = GraphAgent::new(&graph);
        let paths = agent.shortest_paths("gefitinib", "lung cancer", 1);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].0, vec!["gefitinib", "EGFR", "lung cancer"]);
        assert_eq!(paths[0].1.len(), 2);
    }

    #[test]
    fn no_path_to_isolated_node() {
        let graph = graph();
        let agent = GraphAgent::new(&graph);
        assert!(agent.shortest_paths("EGFR", "KRAS", 1).is_empty());
        assert!(agent.shortest_paths("EGFR", "missing", 1).is_empty());
    }

    #[test]
    fn common_connections_require_two_known_entities() {
        let graph = graph();
        let agent = GraphAgent::new(&graph);
        let common =
            agent.common_connections(&["gefitinib".to_string(), "lung cancer".to_string()], 1);
        assert_eq!(common.len(), 1);
        assert_eq!(common[0].0, "EGFR");

        assert!(agent.common_connections(&["gefitinib".to_string()], 1).is_empty());
    }

    #[tokio::test]
    async fn chat_answers_path_questions_with_citations() {
        let graph = graph();
        let agent = GraphAgent::new(&graph);
        let llm = LlmClient::disabled();
        let response = agent
            .chat(
                "Is there a path between gefitinib and lung cancer?",
                &[],
                &llm,
            )
            .await;
        assert!(response.answer.contains("gefitinib -> EGFR -> lung cancer"));
        assert!(response.citations.contains(&"Gefitinib inhibits EGFR.".to_string()));
        assert_eq!(response.tool_calls, vec!["shortest_path"]);
    }

    #[tokio::test]
    async fn chat_falls_back_to_overview() {
        let graph = graph();
        let agent = GraphAgent::new(&graph);
        let llm = LlmClient::disabled();
        let response = agent.chat("What does this graph show?", &[], &llm).await;
        assert_eq!(response.tool_calls, vec!["top_hubs"]);
        assert!(response.answer.contains("EGFR"));
    }
}
