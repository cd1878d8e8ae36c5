//! In-memory job registry and the document processing pipeline.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

use crate::AppState;
use crate::domain::{
    JobId, JobState, Relationship, RelationshipKind, SentenceEntities, normalize_entity,
};
use crate::dto::{GraphData, ProcessingStatus, ProjectSource};
use crate::services::graph::KnowledgeGraph;
use crate::services::llm::ClassifiedRelationship;
use crate::services::{ServiceError, ServiceResult};

/// Tracks the status of every submitted job and bounds how many run at
/// once. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, ProcessingStatus>>>,
    limiter: Arc<Semaphore>,
}

impl JobRegistry {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Register a new pending job and return its id.
    pub async fn create(&self, message: impl Into<String>) -> JobId {
        let job_id = JobId::new();
        let status = ProcessingStatus::pending(job_id.clone(), message);
        self.jobs.write().await.insert(job_id.clone(), status);
        job_id
    }

    pub async fn get(&self, job_id: &JobId) -> Option<ProcessingStatus> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Record pipeline progress for a running job.
    pub async fn update(&self, job_id: &JobId, progress: f64, message: impl Into<String>) {
        if let Some(status) = self.jobs.write().await.get_mut(job_id) {
            status.status = JobState::Processing;
            status.progress = progress;
            status.message = message.into();
        }
    }

    pub async fn complete(&self, job_id: &JobId, result: GraphData, message: impl Into<String>) {
        if let Some(status) = self.jobs.write().await.get_mut(job_id) {
            status.status = JobState::Completed;
            status.progress = 1.0;
            status.message = message.into();
            status.result = Some(result);
        }
    }

    pub async fn fail(&self, job_id: &JobId, message: impl Into<String>) {
        if let Some(status) = self.jobs.write().await.get_mut(job_id) {
            status.status = JobState::Failed;
            status.message = message.into();
        }
    }

    /// Wait for a processing slot. The permit is held for the lifetime of
    /// the pipeline run.
    pub async fn acquire_slot(&self) -> ServiceResult<OwnedSemaphorePermit> {
        self.limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServiceError::Validation("processing queue is shut down".to_string()))
    }
}

/// Run the full pipeline over uploaded PDF files. Spawned as a background
/// task; failures mark the job failed and never propagate.
pub async fn process_documents(
    state: Arc<AppState>,
    job_id: JobId,
    paths: Vec<PathBuf>,
    project_name: Option<String>,
) {
    let _permit = match state.jobs.acquire_slot().await {
        Ok(permit) => permit,
        Err(err) => {
            state.jobs.fail(&job_id, err.to_string()).await;
            return;
        }
    };

    let result = run_document_pipeline(&state, &job_id, &paths, project_name).await;
    for path in &paths {
        if let Err(err) = tokio::fs::remove_file(path).await {
            log::warn!("failed to remove upload {}: {err}", path.display());
        }
    }
    if let Err(err) = result {
        log::error!("job {job_id} failed: {err}");
        state.jobs.fail(&job_id, err.to_string()).await;
    }
}

async fn run_document_pipeline(
    state: &AppState,
    job_id: &JobId,
    paths: &[PathBuf],
    project_name: Option<String>,
) -> ServiceResult<()> {
    let jobs = &state.jobs;
    jobs.update(job_id, 0.1, "Extracting text from PDFs").await;

    let pdf = state.pdf.clone();
    let owned_paths = paths.to_vec();
    let documents = tokio::task::spawn_blocking(move || pdf.process_files(&owned_paths))
        .await
        .map_err(|err| ServiceError::Validation(format!("extraction task aborted: {err}")))?;
    if documents.is_empty() {
        return Err(ServiceError::Validation(
            "no readable text found in the uploaded files".to_string(),
        ));
    }

    let sources: Vec<ProjectSource> = documents
        .iter()
        .map(|doc| ProjectSource {
            source_type: "pdf".to_string(),
            filename: doc.filename.clone(),
        })
        .collect();
    let sentences: Vec<String> = documents
        .iter()
        .flat_map(|doc| doc.sentences.iter().cloned())
        .collect();
    jobs.update(
        job_id,
        0.3,
        format!("Extracted {} sentences", sentences.len()),
    )
    .await;

    finish_pipeline(state, job_id, sentences, project_name, sources).await
}

/// Run the pipeline over raw text instead of uploaded files.
pub async fn process_text(
    state: Arc<AppState>,
    job_id: JobId,
    text: String,
    project_name: Option<String>,
) {
    let _permit = match state.jobs.acquire_slot().await {
        Ok(permit) => permit,
        Err(err) => {
            state.jobs.fail(&job_id, err.to_string()).await;
            return;
        }
    };

    let result = async {
        state.jobs.update(&job_id, 0.2, "Splitting text").await;
        let sentences = state.pdf.split_into_sentences(&text);
        if sentences.is_empty() {
            return Err(ServiceError::Validation(
                "no usable sentences in the submitted text".to_string(),
            ));
        }
        let sources = vec![ProjectSource {
            source_type: "text".to_string(),
            filename: "direct_input".to_string(),
        }];
        finish_pipeline(&state, &job_id, sentences, project_name, sources).await
    }
    .await;

    if let Err(err) = result {
        log::error!("job {job_id} failed: {err}");
        state.jobs.fail(&job_id, err.to_string()).await;
    }
}

/// Shared tail of both pipelines: recognition, relationship extraction,
/// graph construction, persistence.
async fn finish_pipeline(
    state: &AppState,
    job_id: &JobId,
    sentences: Vec<String>,
    project_name: Option<String>,
    sources: Vec<ProjectSource>,
) -> ServiceResult<()> {
    let jobs = &state.jobs;
    jobs.update(job_id, 0.4, "Recognizing entities").await;

    let annotated = state.ner.extract_from_sentences(&sentences);
    let filtered = state
        .ner
        .filter_entities(&annotated, state.ner.min_entity_occurrences);
    let entities = state.ner.unique_entities(&filtered);
    jobs.update(job_id, 0.6, format!("Found {} entities", entities.len()))
        .await;

    jobs.update(job_id, 0.7, "Extracting relationships").await;
    let mut relationships = state.relationships.extract_all(&filtered);

    if state.llm.active() {
        let discovered = discover_relationships(state, &filtered).await;
        if !discovered.is_empty() {
            relationships = state.relationships.merge(relationships, discovered);
        }
        for rel in relationships.iter_mut() {
            if let Some(kind) = state
                .llm
                .classify(&rel.source, &rel.target, &rel.evidence)
                .await
            {
                rel.kind = kind;
            }
        }
    }
    jobs.update(
        job_id,
        0.8,
        format!("Found {} relationships", relationships.len()),
    )
    .await;

    jobs.update(job_id, 0.9, "Building knowledge graph").await;
    let project_name =
        project_name.unwrap_or_else(|| format!("project-{}", job_id.short()));

    // Reprocessing into a named project merges with what is already stored.
    let mut sources = sources;
    let existing = match crate::models::db::find_project(&state.db, &project_name).await? {
        Some(project_id) => crate::models::db::export_project(&state.db, &project_id).await?,
        None => None,
    };
    let graph = match existing {
        Some(export) => {
            let prior_entities = export.graph.to_entities();
            let prior_relationships = export.graph.to_relationships();
            let mut merged_sources = export.sources;
            merged_sources.append(&mut sources);
            sources = merged_sources;
            KnowledgeGraph::merge_parts(
                &prior_entities,
                &prior_relationships,
                &entities,
                &relationships,
            )
        }
        None => KnowledgeGraph::build(&entities, &relationships),
    };
    let graph_data = graph.to_graph_data();
    crate::models::db::save_project(&state.db, &project_name, &graph_data, &sources).await?;

    jobs.complete(
        job_id,
        graph_data,
        format!(
            "Completed: {} entities, {} relationships",
            graph.node_count(),
            graph.edge_count()
        ),
    )
    .await;
    Ok(())
}

/// Ask the model for relationships in every sentence that mentions at
/// least two surviving entities.
async fn discover_relationships(
    state: &AppState,
    sentences: &[SentenceEntities],
) -> Vec<Relationship> {
    let mut out = Vec::new();
    for annotated in sentences {
        if annotated.entities.len() < 2 {
            continue;
        }
        let names: Vec<String> = annotated
            .entities
            .iter()
            .map(|entity| entity.text.clone())
            .collect();
        for found in state
            .llm
            .extract_relationships(&annotated.sentence, &names)
            .await
        {
            if let Some(rel) = discovered_relationship(&found, &names, &annotated.sentence) {
                out.push(rel);
            }
        }
    }
    out
}

/// Accept a model-proposed relationship only when both endpoints resolve
/// to entities recognized in the sentence.
fn discovered_relationship(
    found: &ClassifiedRelationship,
    names: &[String],
    sentence: &str,
) -> Option<Relationship> {
    let resolve = |text: &str| {
        let wanted = normalize_entity(text);
        names
            .iter()
            .find(|name| normalize_entity(name) == wanted)
            .cloned()
    };
    let source = resolve(&found.source)?;
    let target = resolve(&found.target)?;
    if normalize_entity(&source) == normalize_entity(&target) {
        return None;
    }
    Some(Relationship {
        source,
        target,
        weight: 2.0,
        evidence: vec![sentence.to_string()],
        kind: RelationshipKind::from_str_lossy(&found.relationship_type),
    })
}
