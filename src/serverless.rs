//! API Gateway proxy-event adapter for serverless deployments.
//!
//! Routes the JSON endpoints to the same operations the HTTP server uses.
//! Multipart upload is not representable in a proxy event, so document
//! processing is only reachable through text-based submission here.
use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use validator::Validate;

use crate::AppState;
use crate::domain::JobId;
use crate::dto::{GraphData, ProjectExport};
use crate::forms::main::{
    ChatForm, FilterParams, HypothesesForm, LavaRequestsQuery, NerPreviewForm, PaperDiscoveryForm,
    ProcessPapersForm, TrialDiscoveryForm,
};
use crate::routes::error_status;
use crate::services::ServiceError;

/// Incoming API Gateway proxy event. Accepts both the v1 and v2 payload
/// field names.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProxyEvent {
    #[serde(alias = "httpMethod", alias = "method", default)]
    pub http_method: String,
    #[serde(alias = "rawPath", alias = "path", default)]
    pub raw_path: String,
    #[serde(alias = "rawQueryString", alias = "queryString", default)]
    pub raw_query_string: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(alias = "isBase64Encoded", default)]
    pub is_base64_encoded: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProxyResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ProxyResponse {
    fn json(status_code: u16, body: &impl Serialize) -> Self {
        Self {
            status_code,
            headers: [(
                "content-type".to_string(),
                "application/json".to_string(),
            )]
            .into(),
            body: serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    fn ok(body: &impl Serialize) -> Self {
        Self::json(200, body)
    }

    fn error(err: &ServiceError) -> Self {
        Self::json(
            error_status(err).as_u16(),
            &json!({"detail": err.to_string()}),
        )
    }

    fn not_found() -> Self {
        Self::json(404, &json!({"detail": "not found"}))
    }
}

impl ProxyEvent {
    fn decoded_body(&self) -> Result<String, ServiceError> {
        let raw = self.body.clone().unwrap_or_default();
        if self.is_base64_encoded {
            let bytes = STANDARD
                .decode(&raw)
                .map_err(|err| ServiceError::Validation(format!("invalid body encoding: {err}")))?;
            String::from_utf8(bytes)
                .map_err(|err| ServiceError::Validation(format!("body is not utf-8: {err}")))
        } else {
            Ok(raw)
        }
    }

    fn json_body<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        serde_json::from_str(&self.decoded_body()?)
            .map_err(|err| ServiceError::Validation(format!("invalid request body: {err}")))
    }

    fn query<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        serde_urlencoded::from_str(&self.raw_query_string)
            .map_err(|err| ServiceError::Validation(format!("invalid query string: {err}")))
    }
}

fn validated<T: Validate>(form: T) -> Result<T, ServiceError> {
    form.validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;
    Ok(form)
}

/// Route a proxy event to the matching operation.
pub async fn dispatch(state: &Arc<AppState>, event: ProxyEvent) -> ProxyResponse {
    match handle(state, &event).await {
        Ok(response) => response,
        Err(err) => ProxyResponse::error(&err),
    }
}

async fn handle(
    state: &Arc<AppState>,
    event: &ProxyEvent,
) -> Result<ProxyResponse, ServiceError> {
    let method = event.http_method.to_uppercase();
    let path = event.raw_path.trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };

    let response = match (method.as_str(), path) {
        ("GET", "/") => ProxyResponse::ok(&state.health()),
        ("POST", "/api/graph/filter") => {
            let params: FilterParams = event.query()?;
            let graph: GraphData = event.json_body()?;
            ProxyResponse::ok(&state.filter_graph(&graph, &params))
        }
        ("POST", "/api/analytics") => {
            let graph: GraphData = event.json_body()?;
            ProxyResponse::ok(&state.analytics(&graph))
        }
        ("GET", "/api/projects") => {
            ProxyResponse::ok(&crate::models::db::list_projects(&state.db).await?)
        }
        ("POST", "/api/projects/import") => {
            let export: ProjectExport = event.json_body()?;
            let project_id = crate::models::db::import_project(&state.db, &export).await?;
            ProxyResponse::ok(&json!({"project_id": project_id, "status": "imported"}))
        }
        ("POST", "/api/chat") => {
            let form = validated(event.json_body::<ChatForm>()?)?;
            ProxyResponse::ok(&state.chat(&form).await)
        }
        ("POST", "/api/hypotheses") => {
            let form: HypothesesForm = event.json_body()?;
            ProxyResponse::ok(&state.hypotheses(&form))
        }
        ("POST", "/api/ner/preview") => {
            let form = validated(event.json_body::<NerPreviewForm>()?)?;
            ProxyResponse::ok(&state.ner_preview(&form))
        }
        ("POST", "/api/discover/papers") => {
            let form = validated(event.json_body::<PaperDiscoveryForm>()?)?;
            ProxyResponse::ok(&state.discover_papers(&form).await?)
        }
        ("POST", "/api/discover/papers/process") => {
            let form = validated(event.json_body::<ProcessPapersForm>()?)?;
            ProxyResponse::ok(&Arc::clone(state).start_paper_job(&form).await?)
        }
        ("POST", "/api/discover/trials") => {
            let form = validated(event.json_body::<TrialDiscoveryForm>()?)?;
            ProxyResponse::ok(&state.discover_trials(&form).await?)
        }
        ("GET", "/api/lava/usage") => {
            if state.lava.enabled() {
                ProxyResponse::ok(&json!({"enabled": true, "usage": state.lava.usage().await?}))
            } else {
                ProxyResponse::ok(&json!({"enabled": false}))
            }
        }
        ("GET", "/api/lava/requests") => {
            if state.lava.enabled() {
                let params: LavaRequestsQuery = event.query()?;
                let requests = state
                    .lava
                    .requests(params.limit, params.cursor.as_deref())
                    .await?;
                ProxyResponse::ok(&json!({"enabled": true, "requests": requests}))
            } else {
                ProxyResponse::ok(&json!({"enabled": false}))
            }
        }
        ("GET", "/api/lava/status") => ProxyResponse::ok(&state.lava.status()),
        ("POST", "/api/process") => {
            return Err(ServiceError::Validation(
                "multipart upload is not available in serverless deployments; \
                 use /api/discover/papers/process"
                    .to_string(),
            ));
        }
        ("GET", _) if path.starts_with("/api/status/") => {
            let job_id = JobId::from(path["/api/status/".len()..].to_string());
            let status = state.jobs.get(&job_id).await.ok_or(ServiceError::JobNotFound)?;
            ProxyResponse::ok(&status)
        }
        ("GET", _) if path.starts_with("/api/projects/") && path.ends_with("/export") => {
            let project_id = &path["/api/projects/".len()..path.len() - "/export".len()];
            let export = crate::models::db::export_project(&state.db, project_id)
                .await?
                .ok_or(ServiceError::ProjectNotFound)?;
            ProxyResponse::ok(&export)
        }
        _ => ProxyResponse::not_found(),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::Settings;
    use serde_json::Value;

    async fn state() -> Arc<AppState> {
        let settings = Settings::from_vars(&[("database_url", "sqlite::memory:")]).unwrap();
        Arc::new(AppState::initialize(settings).await.unwrap())
    }

    fn get(path: &str) -> ProxyEvent {
        ProxyEvent {
            http_method: "GET".to_string(),
            raw_path: path.to_string(),
            ..Default::default()
        }
    }

    fn post(path: &str, body: Value) -> ProxyEvent {
        ProxyEvent {
            http_method: "POST".to_string(),
            raw_path: path.to_string(),
            body: Some(body.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn health_served_at_root() {
        let state = state().await;
        let response = dispatch(&state, get("/")).await;
        assert_eq!(response.status_code, 200);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "Synapse Mapper API");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let state = state().await;
        let response = dispatch(&state, get("/api/nope")).await;
        assert_eq!(response.status_code, 404);
    }

    #[tokio::test]
    async fn unknown_job_is_404_with_detail() {
        let state = state().await;
        let response = dispatch(&state, get("/api/status/does-not-exist")).await;
        assert_eq!(response.status_code, 404);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["detail"], "job not found");
    }

    #[tokio::test]
    async fn multipart_upload_is_rejected() {
        let state = state().await;
        let response = dispatch(&state, post("/api/process", json!({}))).await;
        assert_eq!(response.status_code, 400);
    }

    #[tokio::test]
    async fn analytics_runs_on_posted_graph() {
        let state = state().await;
        let graph = json!({
            "nodes": [
                {"id": "EGFR", "group": "GENE_OR_GENE_PRODUCT", "value": 1, "metadata": {}},
                {"id": "gefitinib", "group": "CHEMICAL", "value": 1, "metadata": {}}
            ],
            "edges": [
                {"source": "EGFR", "target": "gefitinib", "value": 1.0,
                 "title": "", "metadata": {}}
            ],
            "metadata": {}
        });
        let response = dispatch(&state, post("/api/analytics", graph)).await;
        assert_eq!(response.status_code, 200);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["total_nodes"], 2);
        assert_eq!(body["total_edges"], 1);
    }

    #[tokio::test]
    async fn filter_reads_query_parameters() {
        let state = state().await;
        let graph = json!({
            "nodes": [
                {"id": "EGFR", "group": "GENE_OR_GENE_PRODUCT", "value": 1, "metadata": {}},
                {"id": "KRAS", "group": "GENE_OR_GENE_PRODUCT", "value": 1, "metadata": {}}
            ],
            "edges": [],
            "metadata": {}
        });
        let mut event = post("/api/graph/filter", graph);
        event.raw_query_string = "min_degree=1".to_string();
        let response = dispatch(&state, event).await;
        assert_eq!(response.status_code, 200);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["nodes"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn base64_bodies_are_decoded() {
        let state = state().await;
        let payload = json!({"text": "EGFR binds EGFR. EGFR again."}).to_string();
        let event = ProxyEvent {
            http_method: "POST".to_string(),
            raw_path: "/api/ner/preview".to_string(),
            body: Some(STANDARD.encode(&payload)),
            is_base64_encoded: true,
            ..Default::default()
        };
        let response = dispatch(&state, event).await;
        assert_eq!(response.status_code, 200);
    }

    #[tokio::test]
    async fn lava_endpoints_report_disabled() {
        let state = state().await;
        let response = dispatch(&state, get("/api/lava/usage")).await;
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["enabled"], false);

        let response = dispatch(&state, get("/api/lava/status")).await;
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["configured"], false);
    }
}
