use std::fs;
use std::path::{Path, PathBuf};

use actix_multipart::form::MultipartForm;
use actix_web::{HttpResponse, Responder, get, post, web};
use serde_json::json;
use validator::Validate;

use crate::AppState;
use crate::domain::JobId;
use crate::forms::main::{
    ChatForm, FilterParams, HypothesesForm, LavaRequestsQuery, NerPreviewForm, PaperDiscoveryForm,
    ProcessPapersForm, TrialDiscoveryForm, UploadPdfForm,
};
use crate::sanitize_file_name;
use crate::services::{ServiceError, jobs};

#[get("/")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    web::Json(state.health())
}

#[post("/api/process")]
pub async fn process_documents(
    state: web::Data<AppState>,
    MultipartForm(form): MultipartForm<UploadPdfForm>,
) -> Result<impl Responder, ServiceError> {
    if form.files.is_empty() {
        return Err(ServiceError::NoFiles);
    }
    for file in &form.files {
        let name = file.file_name.as_deref().unwrap_or("");
        if !name.to_lowercase().ends_with(".pdf") {
            return Err(ServiceError::InvalidFileType(name.to_string()));
        }
    }

    let job_id = state.jobs.create("Queued for processing").await;
    let upload_dir = Path::new(crate::UPLOAD_PATH);
    fs::create_dir_all(upload_dir).map_err(ServiceError::SaveFile)?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for file in form.files {
        let raw_name = file.file_name.as_deref().unwrap_or("upload.pdf");
        let file_name = sanitize_file_name(raw_name)
            .ok_or_else(|| ServiceError::InvalidFileType(raw_name.to_string()))?;
        let path = upload_dir.join(format!("{}-{file_name}", job_id.short()));
        file.file
            .persist(&path)
            .map_err(|err| ServiceError::SaveFile(err.error))?;
        paths.push(path);
    }

    let project_name = form.project_name.map(|name| name.into_inner());
    tokio::spawn(jobs::process_documents(
        state.clone().into_inner(),
        job_id.clone(),
        paths,
        project_name,
    ));

    state.jobs.get(&job_id).await.ok_or(ServiceError::JobNotFound).map(web::Json)
}

#[get("/api/status/{job_id}")]
pub async fn job_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, ServiceError> {
    let job_id = JobId::from(path.into_inner());
    state
        .jobs
        .get(&job_id)
        .await
        .ok_or(ServiceError::JobNotFound)
        .map(web::Json)
}

#[post("/api/graph/filter")]
pub async fn filter_graph(
    state: web::Data<AppState>,
    params: web::Query<FilterParams>,
    graph: web::Json<crate::dto::GraphData>,
) -> impl Responder {
    web::Json(state.filter_graph(&graph, &params))
}

#[post("/api/analytics")]
pub async fn analytics(
    state: web::Data<AppState>,
    graph: web::Json<crate::dto::GraphData>,
) -> impl Responder {
    web::Json(state.analytics(&graph))
}

#[get("/api/projects")]
pub async fn list_projects(state: web::Data<AppState>) -> Result<impl Responder, ServiceError> {
    let projects = crate::models::db::list_projects(&state.db).await?;
    Ok(web::Json(projects))
}

#[get("/api/projects/{project_id}/export")]
pub async fn export_project(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, ServiceError> {
    crate::models::db::export_project(&state.db, &path.into_inner())
        .await?
        .ok_or(ServiceError::ProjectNotFound)
        .map(web::Json)
}

#[post("/api/projects/import")]
pub async fn import_project(
    state: web::Data<AppState>,
    export: web::Json<crate::dto::ProjectExport>,
) -> Result<impl Responder, ServiceError> {
    let project_id = crate::models::db::import_project(&state.db, &export).await?;
    Ok(HttpResponse::Ok().json(json!({"project_id": project_id, "status": "imported"})))
}

#[post("/api/chat")]
pub async fn chat(
    state: web::Data<AppState>,
    form: web::Json<ChatForm>,
) -> Result<impl Responder, ServiceError> {
    form.validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;
    Ok(web::Json(state.chat(&form).await))
}

#[post("/api/hypotheses")]
pub async fn hypotheses(
    state: web::Data<AppState>,
    form: web::Json<HypothesesForm>,
) -> impl Responder {
    web::Json(state.hypotheses(&form))
}

#[post("/api/ner/preview")]
pub async fn ner_preview(
    state: web::Data<AppState>,
    form: web::Json<NerPreviewForm>,
) -> Result<impl Responder, ServiceError> {
    form.validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;
    Ok(web::Json(state.ner_preview(&form)))
}

#[post("/api/discover/papers")]
pub async fn discover_papers(
    state: web::Data<AppState>,
    form: web::Json<PaperDiscoveryForm>,
) -> Result<impl Responder, ServiceError> {
    form.validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;
    Ok(web::Json(state.discover_papers(&form).await?))
}

#[post("/api/discover/papers/process")]
pub async fn process_papers(
    state: web::Data<AppState>,
    form: web::Json<ProcessPapersForm>,
) -> Result<impl Responder, ServiceError> {
    form.validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;
    let status = state
        .clone()
        .into_inner()
        .start_paper_job(&form)
        .await?;
    Ok(web::Json(status))
}

#[post("/api/discover/trials")]
pub async fn discover_trials(
    state: web::Data<AppState>,
    form: web::Json<TrialDiscoveryForm>,
) -> Result<impl Responder, ServiceError> {
    form.validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;
    Ok(web::Json(state.discover_trials(&form).await?))
}

#[get("/api/lava/usage")]
pub async fn lava_usage(state: web::Data<AppState>) -> Result<impl Responder, ServiceError> {
    if !state.lava.enabled() {
        return Ok(HttpResponse::Ok().json(json!({"enabled": false})));
    }
    let usage = state.lava.usage().await?;
    Ok(HttpResponse::Ok().json(json!({"enabled": true, "usage": usage})))
}

#[get("/api/lava/requests")]
pub async fn lava_requests(
    state: web::Data<AppState>,
    params: web::Query<LavaRequestsQuery>,
) -> Result<impl Responder, ServiceError> {
    if !state.lava.enabled() {
        return Ok(HttpResponse::Ok().json(json!({"enabled": false})));
    }
    let requests = state
        .lava
        .requests(params.limit, params.cursor.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(json!({"enabled": true, "requests": requests})))
}

#[get("/api/lava/status")]
pub async fn lava_status(state: web::Data<AppState>) -> impl Responder {
    web::Json(state.lava.status())
}
