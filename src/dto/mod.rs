//! Serializable structures crossing the API boundary.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    EntityProfile, EntityType, JobId, JobState, Relationship, RelationshipKind, normalize_entity,
};

/// Graph node shaped for visualization clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub group: EntityType,
    #[serde(default = "default_node_value")]
    pub value: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

fn default_node_value() -> usize {
    1
}

/// Graph edge shaped for visualization clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(default = "default_edge_value")]
    pub value: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

fn default_edge_value() -> f64 {
    1.0
}

/// Complete graph structure exchanged with clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl GraphData {
    /// Recover the entity table a posted graph was built from, keyed by
    /// normalized name.
    pub fn to_entities(&self) -> BTreeMap<String, EntityProfile> {
        self.nodes
            .iter()
            .map(|node| {
                let count = node
                    .metadata
                    .get("count")
                    .and_then(Value::as_u64)
                    .unwrap_or(1) as usize;
                (
                    normalize_entity(&node.id),
                    EntityProfile {
                        original_name: node.id.clone(),
                        entity_type: node.group,
                        count,
                    },
                )
            })
            .collect()
    }

    /// Recover the relationship list a posted graph was built from.
    pub fn to_relationships(&self) -> Vec<Relationship> {
        self.edges
            .iter()
            .map(|edge| {
                let evidence = edge
                    .metadata
                    .get("all_evidence")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_else(|| vec![edge.title.clone()]);
                let kind = edge
                    .metadata
                    .get("relationship_type")
                    .and_then(Value::as_str)
                    .map(RelationshipKind::from_str_lossy)
                    .unwrap_or(RelationshipKind::CoOccurrence);
                Relationship {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    weight: edge.value,
                    evidence,
                    kind,
                }
            })
            .collect()
    }
}

/// Analytics and statistics computed over a graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphAnalytics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub density: f64,
    pub avg_degree: f64,
    pub communities: Vec<Vec<String>>,
    pub centrality_scores: BTreeMap<String, f64>,
    pub entity_counts: BTreeMap<String, usize>,
}

/// Status of a processing job as reported to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub job_id: JobId,
    pub status: JobState,
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GraphData>,
}

impl ProcessingStatus {
    pub fn pending(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            job_id,
            status: JobState::Pending,
            progress: 0.0,
            message: message.into(),
            result: None,
        }
    }
}

/// Summary of a persisted project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
    pub pdf_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
}

/// Full export of a persisted project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectExport {
    pub project_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub graph: GraphData,
    pub sources: Vec<ProjectSource>,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub filename: String,
}

/// Answer produced by the conversational graph agent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub relevant_nodes: Vec<String>,
    #[serde(default)]
    pub relevant_edges: Vec<(String, String)>,
    #[serde(default)]
    pub tool_calls: Vec<String>,
}

/// A generated hypothesis over the graph structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub title: String,
    pub explanation: String,
    pub entities: Vec<String>,
    pub evidence_sentences: Vec<String>,
    pub edge_pairs: Vec<(String, String)>,
    pub confidence: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HypothesesResponse {
    pub hypotheses: Vec<Hypothesis>,
}

/// Per-sentence recognition output for the preview endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NerPreviewResponse {
    pub sentences: Vec<crate::domain::SentenceEntities>,
    pub unique_entities: BTreeMap<String, EntityProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_sentences: Option<Vec<crate::domain::SentenceEntities>>,
    pub debug: NerPreviewDebug,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NerPreviewDebug {
    pub label_counts: BTreeMap<String, usize>,
    pub samples: BTreeMap<String, Vec<String>>,
    pub model: String,
    pub min_entity_occurrences: usize,
    pub used_min_occurrences: usize,
}

/// A paper discovered through PubMed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPaper {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub journal: String,
    #[serde(default)]
    pub year: Option<i32>,
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaperDiscoveryResponse {
    pub papers: Vec<DiscoveredPaper>,
    pub status: String,
}

/// A clinical trial record from ClinicalTrials.gov.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalTrial {
    pub nct_id: String,
    pub title: String,
    pub condition: String,
    pub interventions: Vec<String>,
    pub phase: String,
    pub status: String,
    pub sponsor: String,
    pub brief_summary: String,
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrialDiscoveryResponse {
    pub trials: Vec<ClinicalTrial>,
    pub graph: GraphData,
}

/// Health report served at the root path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub llm_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_graph() -> GraphData {
        serde_json::from_value(json!({
            "nodes": [
                {"id": "EGFR", "group": "GENE_OR_GENE_PRODUCT", "value": 2,
                 "metadata": {"count": 5, "degree": 2}},
                {"id": "gefitinib", "group": "CHEMICAL", "value": 1,
                 "metadata": {}}
            ],
            "edges": [
                {"source": "EGFR", "target": "gefitinib", "value": 3.0,
                 "title": "Gefitinib inhibits EGFR.",
                 "metadata": {"all_evidence": ["Gefitinib inhibits EGFR."],
                              "relationship_type": "INHIBITS"}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn entities_recover_counts_and_types() {
        let entities = sample_graph().to_entities();
        let egfr = &entities["egfr"];
        assert_eq!(egfr.original_name, "EGFR");
        assert_eq!(egfr.entity_type, EntityType::GeneOrGeneProduct);
        assert_eq!(egfr.count, 5);
        // Missing count falls back to 1.
        assert_eq!(entities["gefitinib"].count, 1);
    }

    #[test]
    fn relationships_recover_kind_and_evidence() {
        let rels = sample_graph().to_relationships();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].kind, RelationshipKind::Inhibits);
        assert_eq!(rels[0].evidence, vec!["Gefitinib inhibits EGFR."]);
        assert_eq!(rels[0].weight, 3.0);
    }

    #[test]
    fn edges_without_metadata_fall_back_to_title_evidence() {
        let graph: GraphData = serde_json::from_value(json!({
            "nodes": [],
            "edges": [{"source": "a", "target": "b", "title": "a with b"}]
        }))
        .unwrap();
        let rels = graph.to_relationships();
        assert_eq!(rels[0].evidence, vec!["a with b"]);
        assert_eq!(rels[0].kind, RelationshipKind::CoOccurrence);
        assert_eq!(rels[0].weight, 1.0);
    }
}
