//! Synapse Mapper backend: turns biomedical literature into an interactive
//! knowledge graph.
use std::sync::Arc;

use actix_cors::Cors;
use actix_multipart::form::MultipartFormConfig;
use actix_web::{App, HttpServer, middleware::Logger, web};
use sqlx::SqlitePool;

pub mod domain;
pub mod dto;
pub mod forms;
pub mod models;
pub mod routes;
pub mod serverless;
pub mod services;

use domain::EntityType;
use dto::{
    GraphAnalytics, GraphData, HealthResponse, HypothesesResponse, NerPreviewDebug,
    NerPreviewResponse, PaperDiscoveryResponse, ProcessingStatus, TrialDiscoveryResponse,
};
use forms::main::{
    ChatForm, FilterParams, HypothesesForm, NerPreviewForm, PaperDiscoveryForm, ProcessPapersForm,
    TrialDiscoveryForm,
};
use models::config::Settings;
use services::chat::GraphAgent;
use services::graph::KnowledgeGraph;
use services::hypotheses::HypothesisAgent;
use services::jobs::JobRegistry;
use services::lava::LavaClient;
use services::llm::LlmClient;
use services::ner::EntityRecognizer;
use services::pdf::PdfProcessor;
use services::pubmed::PubMedClient;
use services::relationships::RelationshipExtractor;
use services::trials::ClinicalTrialsClient;
use services::{ServiceError, ServiceResult};

pub const UPLOAD_PATH: &str = "./upload/";

const DEFAULT_HYPOTHESES: usize = 5;
const DEFAULT_PAPER_RESULTS: u32 = 10;
const DEFAULT_TRIAL_RESULTS: u32 = 20;

/// Returns `None` for names that are empty or attempt path traversal.
pub fn sanitize_file_name(input: &str) -> Option<String> {
    let name = std::path::Path::new(input).file_name()?.to_str()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// Shared application state handed to every request handler.
pub struct AppState {
    pub settings: Settings,
    pub db: SqlitePool,
    pub pdf: PdfProcessor,
    pub ner: EntityRecognizer,
    pub relationships: RelationshipExtractor,
    pub llm: LlmClient,
    pub lava: LavaClient,
    pub pubmed: PubMedClient,
    pub trials: ClinicalTrialsClient,
    pub jobs: JobRegistry,
}

impl AppState {
    /// Connect to the database and construct every service from settings.
    pub async fn initialize(settings: Settings) -> Result<Self, sqlx::Error> {
        let db = models::db::init_pool(&settings.database_url).await?;
        let lava = LavaClient::new(&settings);
        Ok(Self {
            db,
            pdf: PdfProcessor::new(),
            ner: EntityRecognizer::new(&settings.scispacy_model),
            relationships: RelationshipExtractor::new(),
            llm: LlmClient::new(&settings, lava.clone()),
            lava,
            pubmed: PubMedClient::new(),
            trials: ClinicalTrialsClient::new(),
            jobs: JobRegistry::new(settings.max_concurrent_processing),
            settings,
        })
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            service: "Synapse Mapper API".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            llm_enabled: self.llm.active(),
        }
    }

    /// Reconstruct a graph from its serialized form so the analytical
    /// operations can run on client-supplied graphs.
    fn rebuild_graph(&self, data: &GraphData) -> KnowledgeGraph {
        KnowledgeGraph::build(&data.to_entities(), &data.to_relationships())
    }

    pub fn filter_graph(&self, data: &GraphData, params: &FilterParams) -> GraphData {
        let graph = self.rebuild_graph(data);
        let types: Option<Vec<EntityType>> = params.entity_types.as_deref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(EntityType::from_str_lossy)
                .collect()
        });
        graph.filter(
            params.min_degree.unwrap_or(1),
            types.as_deref(),
            params.top_n,
        )
    }

    pub fn analytics(&self, data: &GraphData) -> GraphAnalytics {
        self.rebuild_graph(data).analytics()
    }

    pub async fn chat(&self, form: &ChatForm) -> dto::ChatResponse {
        let graph = self.rebuild_graph(&form.graph);
        GraphAgent::new(&graph)
            .chat(&form.message, &form.conversation_history, &self.llm)
            .await
    }

    pub fn hypotheses(&self, form: &HypothesesForm) -> HypothesesResponse {
        let graph = self.rebuild_graph(&form.graph);
        let hypotheses = HypothesisAgent::new(&graph).generate(
            form.focus_entity.as_deref(),
            form.max_results.unwrap_or(DEFAULT_HYPOTHESES),
        );
        HypothesesResponse { hypotheses }
    }

    pub fn ner_preview(&self, form: &NerPreviewForm) -> NerPreviewResponse {
        let sentences = self.pdf.split_into_sentences(&form.text);
        let annotated = self.ner.extract_from_sentences(&sentences);
        let min_occurrences = form
            .min_occurrences
            .unwrap_or(self.ner.min_entity_occurrences);
        let filtered = self.ner.filter_entities(&annotated, min_occurrences);

        let mut label_counts = std::collections::BTreeMap::new();
        let mut samples: std::collections::BTreeMap<String, Vec<String>> = Default::default();
        for sentence in &sentences {
            for (text, label) in self.ner.raw_spans(sentence) {
                *label_counts.entry(label.clone()).or_insert(0) += 1;
                let entry = samples.entry(label).or_default();
                if entry.len() < 5 && !entry.contains(&text) {
                    entry.push(text);
                }
            }
        }

        NerPreviewResponse {
            unique_entities: self.ner.unique_entities(&filtered),
            sentences: filtered,
            raw_sentences: form.include_raw.then_some(annotated),
            debug: NerPreviewDebug {
                label_counts,
                samples,
                model: self.ner.model_name().to_string(),
                min_entity_occurrences: self.ner.min_entity_occurrences,
                used_min_occurrences: min_occurrences,
            },
        }
    }

    pub async fn discover_papers(
        &self,
        form: &PaperDiscoveryForm,
    ) -> ServiceResult<PaperDiscoveryResponse> {
        let papers = self
            .pubmed
            .discover(&form.query, form.max_results.unwrap_or(DEFAULT_PAPER_RESULTS))
            .await?;
        Ok(PaperDiscoveryResponse {
            status: format!("found {} papers", papers.len()),
            papers,
        })
    }

    /// Queue a processing job over discovered paper abstracts.
    pub async fn start_paper_job(
        self: Arc<Self>,
        form: &ProcessPapersForm,
    ) -> ServiceResult<ProcessingStatus> {
        let text: String = form
            .papers
            .iter()
            .map(|paper| format!("{}. {}", paper.title, paper.abstract_text))
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(ServiceError::Validation(
                "selected papers have no text".to_string(),
            ));
        }

        let job_id = self.jobs.create("Queued for processing").await;
        tokio::spawn(services::jobs::process_text(
            Arc::clone(&self),
            job_id.clone(),
            text,
            form.project_name.clone(),
        ));
        self.jobs.get(&job_id).await.ok_or(ServiceError::JobNotFound)
    }

    pub async fn discover_trials(
        &self,
        form: &TrialDiscoveryForm,
    ) -> ServiceResult<TrialDiscoveryResponse> {
        let trials = self
            .trials
            .search(
                &form.condition,
                form.max_results.unwrap_or(DEFAULT_TRIAL_RESULTS),
                &form.phases,
                &form.statuses,
            )
            .await?;
        let graph = services::trials::trials_to_graph(&trials);
        Ok(TrialDiscoveryResponse { trials, graph })
    }
}

/// Start the HTTP server with CORS and upload limits from settings.
pub async fn run(state: AppState) -> std::io::Result<()> {
    let bind_addr = (state.settings.api_host.clone(), state.settings.api_port);
    let max_upload = state.settings.max_upload_size_mb as usize * 1024 * 1024;
    let cors_origins = state.settings.cors_origins.clone();
    let data = web::Data::new(state);

    log::info!("Listening on {}:{}", bind_addr.0, bind_addr.1);
    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allow_any_method()
            .allow_any_header()
            .supports_credentials();
        for origin in &cors_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .app_data(data.clone())
            .app_data(
                MultipartFormConfig::default()
                    .total_limit(max_upload)
                    .memory_limit(max_upload),
            )
            .wrap(cors)
            .wrap(Logger::default())
            .service(routes::main::health)
            .service(routes::main::process_documents)
            .service(routes::main::job_status)
            .service(routes::main::filter_graph)
            .service(routes::main::analytics)
            .service(routes::main::list_projects)
            .service(routes::main::export_project)
            .service(routes::main::import_project)
            .service(routes::main::chat)
            .service(routes::main::hypotheses)
            .service(routes::main::ner_preview)
            .service(routes::main::discover_papers)
            .service(routes::main::process_papers)
            .service(routes::main::discover_trials)
            .service(routes::main::lava_usage)
            .service(routes::main::lava_requests)
            .service(routes::main::lava_status)
    })
    .bind(bind_addr)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("paper.pdf"), Some("paper.pdf".to_string()));
        assert_eq!(
            sanitize_file_name("/tmp/evil/../paper.pdf"),
            Some("paper.pdf".to_string())
        );
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name(".."), None);
    }
}
