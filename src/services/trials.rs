//! Clinical-trial discovery through the ClinicalTrials.gov v2 API.
use std::collections::BTreeSet;

use serde_json::{Value, json};

use crate::domain::{EntityType, RelationshipKind};
use crate::dto::{ClinicalTrial, GraphData, GraphEdge, GraphNode};
use crate::services::ServiceResult;

const STUDIES_URL: &str = "https://clinicaltrials.gov/api/v2/studies";
const MAX_PAGE_SIZE: u32 = 100;
const SUMMARY_EVIDENCE_CHARS: usize = 200;

#[derive(Clone)]
pub struct ClinicalTrialsClient {
    http: reqwest::Client,
}

impl Default for ClinicalTrialsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ClinicalTrialsClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Trials registered for a condition, optionally narrowed by phase and
    /// recruitment status.
    pub async fn search(
        &self,
        condition: &str,
        max_results: u32,
        phases: &[String],
        statuses: &[String],
    ) -> ServiceResult<Vec<ClinicalTrial>> {
        let mut query: Vec<(&str, String)> = vec![
            ("query.cond", condition.to_string()),
            ("pageSize", max_results.min(MAX_PAGE_SIZE).to_string()),
            ("format", "json".to_string()),
        ];
        if !phases.is_empty() {
            query.push(("query.phase", phases.join(",")));
        }
        if !statuses.is_empty() {
            query.push(("query.status", statuses.join(",")));
        }

        let response = self
            .http
            .get(STUDIES_URL)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;

        let studies = body["studies"].as_array().cloned().unwrap_or_default();
        Ok(studies.iter().map(parse_study).collect())
    }
}

fn text(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

fn parse_study(study: &Value) -> ClinicalTrial {
    let protocol = &study["protocolSection"];
    let identification = &protocol["identificationModule"];
    let nct_id = text(&identification["nctId"]);

    let interventions = protocol["armsInterventionsModule"]["interventions"]
        .as_array()
        .map(|items| items.iter().map(|item| text(&item["name"])).collect())
        .unwrap_or_default();
    let phase = protocol["designModule"]["phases"]
        .as_array()
        .and_then(|phases| phases.first())
        .map(text)
        .unwrap_or_default();

    ClinicalTrial {
        url: format!("https://clinicaltrials.gov/study/{nct_id}"),
        nct_id,
        title: text(&identification["briefTitle"]),
        condition: protocol["conditionsModule"]["conditions"]
            .as_array()
            .and_then(|conditions| conditions.first())
            .map(text)
            .unwrap_or_default(),
        interventions,
        phase,
        status: text(&protocol["statusModule"]["overallStatus"]),
        sponsor: text(&protocol["sponsorCollaboratorsModule"]["leadSponsor"]["name"]),
        brief_summary: text(&protocol["descriptionModule"]["briefSummary"]),
    }
}

/// Render trials as a small graph: each trial node links to its condition
/// and to every intervention it tests.
pub fn trials_to_graph(trials: &[ClinicalTrial]) -> GraphData {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for trial in trials {
        if trial.nct_id.is_empty() {
            continue;
        }
        let trial_node = format!("TRIAL:{}", trial.nct_id);
        if seen.insert(trial_node.clone()) {
            nodes.push(GraphNode {
                id: trial_node.clone(),
                group: EntityType::Entity,
                value: 1,
                metadata: [
                    ("type".to_string(), json!("clinical_trial")),
                    ("nct_id".to_string(), json!(trial.nct_id)),
                    ("phase".to_string(), json!(trial.phase)),
                    ("status".to_string(), json!(trial.status)),
                    ("url".to_string(), json!(trial.url)),
                ]
                .into(),
            });
        }

        let evidence: String = trial
            .brief_summary
            .chars()
            .take(SUMMARY_EVIDENCE_CHARS)
            .collect();

        if !trial.condition.is_empty() {
            if seen.insert(trial.condition.clone()) {
                nodes.push(GraphNode {
                    id: trial.condition.clone(),
                    group: EntityType::Disease,
                    value: 1,
                    metadata: Default::default(),
                });
            }
            edges.push(GraphEdge {
                source: trial_node.clone(),
                target: trial.condition.clone(),
                value: 1.0,
                title: evidence.clone(),
                metadata: [(
                    "relationship_type".to_string(),
                    json!(RelationshipKind::ClinicalTrialStudies.as_str()),
                )]
                .into(),
            });
        }

        for intervention in &trial.interventions {
            if intervention.is_empty() {
                continue;
            }
            if seen.insert(intervention.clone()) {
                nodes.push(GraphNode {
                    id: intervention.clone(),
                    group: EntityType::Chemical,
                    value: 1,
                    metadata: Default::default(),
                });
            }
            edges.push(GraphEdge {
                source: trial_node.clone(),
                target: intervention.clone(),
                value: 1.0,
                title: evidence.clone(),
                metadata: [(
                    "relationship_type".to_string(),
                    json!(RelationshipKind::ClinicalTrialTests.as_str()),
                )]
                .into(),
            });
        }
    }

    GraphData {
        nodes,
        edges,
        metadata: [
            ("source".to_string(), json!("clinicaltrials.gov")),
            ("trial_count".to_string(), json!(trials.len())),
        ]
        .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_study() -> Value {
        json!({
            "protocolSection": {
                "identificationModule": {
                    "nctId": "NCT01234567",
                    "briefTitle": "Gefitinib in EGFR-Mutant Lung Cancer"
                },
                "statusModule": {"overallStatus": "RECRUITING"},
                "designModule": {"phases": ["PHASE3"]},
                "conditionsModule": {"conditions": ["Lung Cancer"]},
                "armsInterventionsModule": {
                    "interventions": [{"name": "Gefitinib"}, {"name": "Placebo"}]
                },
                "sponsorCollaboratorsModule": {"leadSponsor": {"name": "Example University"}},
                "descriptionModule": {"briefSummary": "Tests gefitinib against placebo."}
            }
        })
    }

    #[test]
    fn parses_protocol_section() {
        let trial = parse_study(&sample_study());
        assert_eq!(trial.nct_id, "NCT01234567");
        assert_eq!(trial.condition, "Lung Cancer");
        assert_eq!(trial.interventions, vec!["Gefitinib", "Placebo"]);
        assert_eq!(trial.phase, "PHASE3");
        assert_eq!(trial.status, "RECRUITING");
        assert_eq!(trial.sponsor, "Example University");
        assert_eq!(trial.url, "https://clinicaltrials.gov/study/NCT01234567");
    }

    #[test]
    fn missing_modules_parse_to_empty_fields() {
        let trial = parse_study(&json!({"protocolSection": {
            "identificationModule": {"nctId": "NCT00000001"}
        }}));
        assert_eq!(trial.nct_id, "NCT00000001");
        assert!(trial.condition.is_empty());
        assert!(trial.interventions.is_empty());
    }

    #[test]
    fn graph_links_trial_to_condition_and_interventions() {
        let trials = vec![parse_study(&sample_study())];
        let graph = trials_to_graph(&trials);

        // trial + condition + two interventions
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.edges.len(), 3);
        assert!(graph.nodes.iter().any(|n| n.id == "TRIAL:NCT01234567"));

        let condition_edge = graph
            .edges
            .iter()
            .find(|e| e.target == "Lung Cancer")
            .unwrap();
        assert_eq!(
            condition_edge.metadata["relationship_type"],
            "CLINICAL_TRIAL_STUDIES"
        );
        assert_eq!(graph.metadata["source"], "clinicaltrials.gov");
    }

    #[test]
    fn shared_nodes_are_not_duplicated() {
        let mut first = parse_study(&sample_study());
        let mut second = first.clone();
        second.nct_id = "NCT09999999".to_string();
        first.interventions = vec!["Gefitinib".to_string()];
        second.interventions = vec!["Gefitinib".to_string()];

        let graph = trials_to_graph(&[first, second]);
        let gefitinib_nodes = graph.nodes.iter().filter(|n| n.id == "Gefitinib").count();
        assert_eq!(gefitinib_nodes, 1);
    }
}
