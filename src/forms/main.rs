use actix_multipart::form::{MultipartForm, tempfile::TempFile, text::Text};
use serde::Deserialize;
use validator::Validate;

use crate::dto::{DiscoveredPaper, GraphData};
use crate::services::chat::ChatTurn;

#[derive(MultipartForm)]
pub struct UploadPdfForm {
    #[multipart(rename = "files")]
    pub files: Vec<TempFile>,
    pub project_name: Option<Text<String>>,
}

#[derive(Deserialize, Validate)]
pub struct NerPreviewForm {
    #[validate(length(min = 1))]
    pub text: String,
    pub min_occurrences: Option<usize>,
    #[serde(default)]
    pub include_raw: bool,
}

#[derive(Deserialize, Validate)]
pub struct ChatForm {
    #[validate(length(min = 1))]
    pub message: String,
    pub graph: GraphData,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
}

#[derive(Deserialize, Validate)]
pub struct HypothesesForm {
    pub graph: GraphData,
    pub focus_entity: Option<String>,
    pub max_results: Option<usize>,
}

/// Query parameters of the graph filter endpoint; the graph itself is the
/// request body.
#[derive(Deserialize)]
pub struct FilterParams {
    pub min_degree: Option<usize>,
    /// Comma-separated entity type names.
    pub entity_types: Option<String>,
    pub top_n: Option<usize>,
}

#[derive(Deserialize, Validate)]
pub struct PaperDiscoveryForm {
    #[validate(length(min = 1))]
    pub query: String,
    pub max_results: Option<u32>,
}

#[derive(Deserialize, Validate)]
pub struct ProcessPapersForm {
    #[validate(length(min = 1))]
    pub papers: Vec<DiscoveredPaper>,
    pub project_name: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct TrialDiscoveryForm {
    #[validate(length(min = 1))]
    pub condition: String,
    pub max_results: Option<u32>,
    #[serde(default)]
    pub phases: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
}

#[derive(Deserialize)]
pub struct LavaRequestsQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}
