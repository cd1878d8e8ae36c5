//! Knowledge-graph construction, analytics, and filtering.
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde_json::{Value, json};

use crate::domain::{EntityProfile, EntityType, Relationship, RelationshipKind, edge_key};
use crate::dto::{GraphAnalytics, GraphData, GraphEdge, GraphNode};

/// Centrality entries reported in analytics.
const CENTRALITY_TOP_N: usize = 20;

#[derive(Clone, Debug)]
struct NodeInfo {
    entity_type: EntityType,
    count: usize,
}

#[derive(Clone, Debug)]
struct EdgeInfo {
    weight: f64,
    evidence: Vec<String>,
    kind: RelationshipKind,
}

/// Undirected weighted graph over recognized entities. Node and edge maps
/// are ordered so every derived output is deterministic.
#[derive(Clone, Debug, Default)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<String, NodeInfo>,
    edges: BTreeMap<(String, String), EdgeInfo>,
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl KnowledgeGraph {
    /// Build a graph from aggregated entities and extracted relationships.
    /// Relationships whose endpoints are not both known entities are
    /// dropped.
    pub fn build(
        entities: &BTreeMap<String, EntityProfile>,
        relationships: &[Relationship],
    ) -> Self {
        let mut graph = Self::default();

        for profile in entities.values() {
            graph.nodes.insert(
                profile.original_name.clone(),
                NodeInfo {
                    entity_type: profile.entity_type,
                    count: profile.count,
                },
            );
            graph
                .adjacency
                .entry(profile.original_name.clone())
                .or_default();
        }

        for rel in relationships {
            if !graph.nodes.contains_key(&rel.source) || !graph.nodes.contains_key(&rel.target) {
                continue;
            }
            if rel.source == rel.target {
                continue;
            }
            graph.edges.insert(
                edge_key(&rel.source, &rel.target),
                EdgeInfo {
                    weight: rel.weight,
                    evidence: rel.evidence.clone(),
                    kind: rel.kind,
                },
            );
            graph
                .adjacency
                .entry(rel.source.clone())
                .or_default()
                .insert(rel.target.clone());
            graph
                .adjacency
                .entry(rel.target.clone())
                .or_default()
                .insert(rel.source.clone());
        }

        graph
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn degree(&self, node: &str) -> usize {
        self.adjacency.get(node).map_or(0, BTreeSet::len)
    }

    pub fn neighbors(&self, node: &str) -> impl Iterator<Item = &String> {
        self.adjacency.get(node).into_iter().flatten()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Weight, evidence, and kind of the edge between two nodes, if any.
    pub fn edge(&self, a: &str, b: &str) -> Option<(f64, &[String], RelationshipKind)> {
        self.edges
            .get(&edge_key(a, b))
            .map(|info| (info.weight, info.evidence.as_slice(), info.kind))
    }

    /// Serialize to the client-facing shape: node value is its degree,
    /// edge title is the first evidence sentence.
    pub fn to_graph_data(&self) -> GraphData {
        let nodes = self
            .nodes
            .iter()
            .map(|(id, info)| {
                let degree = self.degree(id);
                GraphNode {
                    id: id.clone(),
                    group: info.entity_type,
                    value: degree,
                    metadata: BTreeMap::from([
                        ("count".to_string(), json!(info.count)),
                        ("degree".to_string(), json!(degree)),
                    ]),
                }
            })
            .collect();

        let edges = self
            .edges
            .iter()
            .map(|((source, target), info)| {
                let title = info
                    .evidence
                    .first()
                    .cloned()
                    .unwrap_or_else(|| format!("{source} co-occurs with {target}"));
                GraphEdge {
                    source: source.clone(),
                    target: target.clone(),
                    value: info.weight,
                    title,
                    metadata: BTreeMap::from([
                        ("all_evidence".to_string(), json!(info.evidence)),
                        ("relationship_type".to_string(), json!(info.kind.as_str())),
                    ]),
                }
            })
            .collect();

        GraphData {
            nodes,
            edges,
            metadata: BTreeMap::from([
                ("total_nodes".to_string(), json!(self.node_count())),
                ("total_edges".to_string(), json!(self.edge_count())),
                ("density".to_string(), json!(self.density())),
            ]),
        }
    }

    pub fn density(&self) -> f64 {
        let n = self.node_count();
        if n < 2 {
            return 0.0;
        }
        (2.0 * self.edge_count() as f64) / (n as f64 * (n - 1) as f64)
    }

    /// Compute the full analytics report.
    pub fn analytics(&self) -> GraphAnalytics {
        let total_nodes = self.node_count();
        if total_nodes == 0 {
            return GraphAnalytics {
                total_nodes: 0,
                total_edges: 0,
                density: 0.0,
                avg_degree: 0.0,
                communities: Vec::new(),
                centrality_scores: BTreeMap::new(),
                entity_counts: BTreeMap::new(),
            };
        }

        let degree_sum: usize = self.nodes.keys().map(|id| self.degree(id)).sum();
        let centrality = self.betweenness_centrality();
        let mut top: Vec<(String, f64)> = centrality.into_iter().collect();
        top.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(CENTRALITY_TOP_N);

        let mut entity_counts: BTreeMap<String, usize> = BTreeMap::new();
        for info in self.nodes.values() {
            *entity_counts
                .entry(info.entity_type.as_str().to_string())
                .or_default() += 1;
        }

        GraphAnalytics {
            total_nodes,
            total_edges: self.edge_count(),
            density: self.density(),
            avg_degree: degree_sum as f64 / total_nodes as f64,
            communities: self.communities(),
            centrality_scores: top.into_iter().collect(),
            entity_counts,
        }
    }

    /// Community detection by label propagation. Labels start as the node
    /// names; nodes are visited in order and adopt the most frequent label
    /// among their neighbors (smallest label wins ties), until stable.
    pub fn communities(&self) -> Vec<Vec<String>> {
        if self.node_count() < 2 {
            return self.nodes.keys().map(|id| vec![id.clone()]).collect();
        }

        let mut labels: BTreeMap<String, String> = self
            .nodes
            .keys()
            .map(|id| (id.clone(), id.clone()))
            .collect();

        for _ in 0..20 {
            let mut changed = false;
            for id in self.nodes.keys() {
                let mut tally: BTreeMap<String, usize> = BTreeMap::new();
                for neighbor in self.neighbors(id) {
                    *tally.entry(labels[neighbor].clone()).or_default() += 1;
                }
                let Some(best) = tally
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                    .map(|(label, _)| label)
                else {
                    continue;
                };
                if labels[id] != best {
                    labels.insert(id.clone(), best);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (id, label) in labels {
            groups.entry(label).or_default().push(id);
        }
        groups.into_values().collect()
    }

    /// Betweenness centrality (Brandes, unweighted), normalized the way
    /// networkx reports it for undirected graphs.
    pub fn betweenness_centrality(&self) -> BTreeMap<String, f64> {
        let ids: Vec<&String> = self.nodes.keys().collect();
        let index: HashMap<&String, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let n = ids.len();
        let mut centrality = vec![0.0f64; n];

        for s in 0..n {
            let mut stack = Vec::new();
            let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut sigma = vec![0.0f64; n];
            let mut dist = vec![-1i64; n];
            sigma[s] = 1.0;
            dist[s] = 0;

            let mut queue = VecDeque::from([s]);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for w_id in self.neighbors(ids[v]) {
                    let w = index[w_id];
                    if dist[w] < 0 {
                        dist[w] = dist[v] + 1;
                        queue.push_back(w);
                    }
                    if dist[w] == dist[v] + 1 {
                        sigma[w] += sigma[v];
                        predecessors[w].push(v);
                    }
                }
            }

            let mut delta = vec![0.0f64; n];
            while let Some(w) = stack.pop() {
                for &v in &predecessors[w] {
                    delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
                }
                if w != s {
                    centrality[w] += delta[w];
                }
            }
        }

        // Undirected accumulation counts each pair twice; the networkx
        // normalization 2/((n-1)(n-2)) folds the halving into one factor.
        let scale = if n > 2 {
            1.0 / ((n - 1) as f64 * (n - 2) as f64)
        } else {
            0.5
        };
        ids.into_iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), centrality[i] * scale))
            .collect()
    }

    /// Filter by minimum degree, entity types, and top-N by degree,
    /// returning a rebuilt client-facing graph. Degrees are evaluated
    /// against the unfiltered graph.
    pub fn filter(
        &self,
        min_degree: usize,
        entity_types: Option<&[EntityType]>,
        top_n: Option<usize>,
    ) -> GraphData {
        let mut keep: Vec<&String> = self
            .nodes
            .iter()
            .filter(|(id, info)| {
                self.degree(id) >= min_degree
                    && entity_types.is_none_or(|types| types.contains(&info.entity_type))
            })
            .map(|(id, _)| id)
            .collect();

        if let Some(top_n) = top_n {
            keep.sort_by(|a, b| {
                self.degree(b)
                    .cmp(&self.degree(a))
                    .then_with(|| a.cmp(b))
            });
            keep.truncate(top_n);
        }
        let kept: BTreeSet<&String> = keep.into_iter().collect();

        let mut filtered = Self::default();
        for id in &kept {
            let info = &self.nodes[*id];
            filtered.nodes.insert((*id).clone(), info.clone());
            filtered.adjacency.entry((*id).clone()).or_default();
        }
        for ((source, target), info) in &self.edges {
            if kept.contains(source) && kept.contains(target) {
                filtered
                    .edges
                    .insert((source.clone(), target.clone()), info.clone());
                filtered
                    .adjacency
                    .entry(source.clone())
                    .or_default()
                    .insert(target.clone());
                filtered
                    .adjacency
                    .entry(target.clone())
                    .or_default()
                    .insert(source.clone());
            }
        }

        let mut data = filtered.to_graph_data();
        data.metadata = BTreeMap::from([("filtered".to_string(), Value::Bool(true))]);
        data
    }

    /// Merge two extraction results: union of entities keeping the higher
    /// count, edge weights aggregated, evidence combined (up to 5 kept).
    pub fn merge_parts(
        base_entities: &BTreeMap<String, EntityProfile>,
        base_relationships: &[Relationship],
        new_entities: &BTreeMap<String, EntityProfile>,
        new_relationships: &[Relationship],
    ) -> Self {
        let mut entities = base_entities.clone();
        for (key, profile) in new_entities {
            entities
                .entry(key.clone())
                .and_modify(|existing| existing.count = existing.count.max(profile.count))
                .or_insert_with(|| profile.clone());
        }

        let mut merged: BTreeMap<(String, String), Relationship> = base_relationships
            .iter()
            .map(|rel| (rel.edge_key(), rel.clone()))
            .collect();
        for rel in new_relationships {
            match merged.entry(rel.edge_key()) {
                std::collections::btree_map::Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    existing.weight += rel.weight;
                    for sentence in &rel.evidence {
                        if !existing.evidence.contains(sentence) {
                            existing.evidence.push(sentence.clone());
                        }
                    }
                    existing.evidence.truncate(5);
                }
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(rel.clone());
                }
            }
        }

        let relationships: Vec<Relationship> = merged.into_values().collect();
        Self::build(&entities, &relationships)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::normalize_entity;

    fn profile(name: &str, entity_type: EntityType, count: usize) -> (String, EntityProfile) {
        (
            normalize_entity(name),
            EntityProfile {
                original_name: name.to_string(),
                entity_type,
                count,
            },
        )
    }

    fn rel(source: &str, target: &str, weight: f64) -> Relationship {
        Relationship {
            source: source.to_string(),
            target: target.to_string(),
            weight,
            evidence: vec![format!("{source} with {target}.")],
            kind: RelationshipKind::CoOccurrence,
        }
    }

    fn sample() -> KnowledgeGraph {
        let entities = BTreeMap::from([
            profile("EGFR", EntityType::GeneOrGeneProduct, 5),
            profile("gefitinib", EntityType::Chemical, 3),
            profile("lung cancer", EntityType::Disease, 4),
            profile("KRAS", EntityType::GeneOrGeneProduct, 2),
        ]);
        let relationships = vec![
            rel("EGFR", "gefitinib", 3.0),
            rel("EGFR", "lung cancer", 2.0),
            rel("gefitinib", "lung cancer", 1.0),
        ];
        KnowledgeGraph::build(&entities, &relationships)
    }

    #[test]
    fn build_drops_edges_with_unknown_endpoints() {
        let entities = BTreeMap::from([profile("EGFR", EntityType::GeneOrGeneProduct, 1)]);
        let graph = KnowledgeGraph::build(&entities, &[rel("EGFR", "ghost", 1.0)]);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn graph_data_is_deterministic_and_degree_valued() {
        let data = sample().to_graph_data();
        let ids: Vec<&str> = data.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["EGFR", "KRAS", "gefitinib", "lung cancer"]);

        let egfr = &data.nodes[0];
        assert_eq!(egfr.value, 2);
        assert_eq!(egfr.metadata["count"], json!(5));

        let edge = &data.edges[0];
        assert_eq!(edge.title, "EGFR with gefitinib.");
        assert_eq!(edge.metadata["relationship_type"], json!("CO_OCCURRENCE"));
    }

    #[test]
    fn density_counts_undirected_pairs() {
        let graph = sample();
        // 3 edges over C(4,2)=6 possible.
        assert!((graph.density() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn analytics_reports_counts_and_types() {
        let analytics = sample().analytics();
        assert_eq!(analytics.total_nodes, 4);
        assert_eq!(analytics.total_edges, 3);
        assert_eq!(analytics.entity_counts["GENE_OR_GENE_PRODUCT"], 2);
        assert_eq!(analytics.entity_counts["CHEMICAL"], 1);
        assert!((analytics.avg_degree - 1.5).abs() < 1e-9);
    }

    #[test]
    fn empty_graph_analytics_are_zeroed() {
        let graph = KnowledgeGraph::build(&BTreeMap::new(), &[]);
        let analytics = graph.analytics();
        assert_eq!(analytics.total_nodes, 0);
        assert_eq!(analytics.density, 0.0);
        assert!(analytics.communities.is_empty());
    }

    #[test]
    fn betweenness_peaks_on_path_center() {
        let entities = BTreeMap::from([
            profile("a", EntityType::Entity, 1),
            profile("b", EntityType::Entity, 1),
            profile("c", EntityType::Entity, 1),
        ]);
        let relationships = vec![rel("a", "b", 1.0), rel("b", "c", 1.0)];
        let graph = KnowledgeGraph::build(&entities, &relationships);
        let centrality = graph.betweenness_centrality();

        assert!(centrality["b"] > centrality["a"]);
        assert_eq!(centrality["a"], 0.0);
        // networkx value for the middle of a 3-path.
        assert!((centrality["b"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn filter_by_degree_and_top_n() {
        let graph = sample();
        let filtered = graph.filter(2, None, None);
        let ids: Vec<&str> = filtered.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["EGFR", "gefitinib", "lung cancer"]);

        let top = graph.filter(0, None, Some(1));
        assert_eq!(top.nodes.len(), 1);
        assert_eq!(top.nodes[0].id, "EGFR");
        assert!(top.edges.is_empty());
    }

    #[test]
    fn filter_by_entity_type() {
        let graph = sample();
        let filtered = graph.filter(0, Some(&[EntityType::GeneOrGeneProduct]), None);
        let ids: Vec<&str> = filtered.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["EGFR", "KRAS"]);
    }

    #[test]
    fn merge_aggregates_weights_and_counts() {
        let base_entities = BTreeMap::from([
            profile("EGFR", EntityType::GeneOrGeneProduct, 2),
            profile("gefitinib", EntityType::Chemical, 1),
        ]);
        let base_rels = vec![rel("EGFR", "gefitinib", 1.0)];
        let new_entities = BTreeMap::from([
            profile("EGFR", EntityType::GeneOrGeneProduct, 7),
            profile("KRAS", EntityType::GeneOrGeneProduct, 1),
        ]);
        let new_rels = vec![rel("EGFR", "gefitinib", 2.0)];

        let merged =
            KnowledgeGraph::merge_parts(&base_entities, &base_rels, &new_entities, &new_rels);
        assert_eq!(merged.node_count(), 3);
        let (weight, _, _) = merged.edge("EGFR", "gefitinib").unwrap();
        assert_eq!(weight, 3.0);
        let data = merged.to_graph_data();
        let egfr = data.nodes.iter().find(|n| n.id == "EGFR").unwrap();
        assert_eq!(egfr.metadata["count"], json!(7));
    }

    #[test]
    fn communities_separate_disconnected_clusters() {
        let entities = BTreeMap::from([
            profile("a", EntityType::Entity, 1),
            profile("b", EntityType::Entity, 1),
            profile("c", EntityType::Entity, 1),
            profile("d", EntityType::Entity, 1),
        ]);
        let relationships = vec![rel("a", "b", 1.0), rel("c", "d", 1.0)];
        let graph = KnowledgeGraph::build(&entities, &relationships);
        let mut communities = graph.communities();
        communities.iter_mut().for_each(|c| c.sort());

        assert_eq!(communities.len(), 2);
        assert!(communities.contains(&vec!["a".to_string(), "b".to_string()]));
        assert!(communities.contains(&vec!["c".to_string(), "d".to_string()]));
    }
}
