//! Application services orchestrating the extraction pipeline and
//! integrations.
pub mod chat;
pub mod graph;
pub mod hypotheses;
pub mod jobs;
pub mod lava;
pub mod llm;
pub mod ner;
pub mod pdf;
pub mod pubmed;
pub mod relationships;
pub mod trials;

/// Convenience alias for service results.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("no files provided")]
    NoFiles,
    #[error("invalid file type: {0}. Only PDF files are supported.")]
    InvalidFileType(String),
    #[error("job not found")]
    JobNotFound,
    #[error("project not found")]
    ProjectNotFound,
    #[error("failed to extract text from PDF")]
    PdfExtraction(#[source] pdf_extract::OutputError),
    #[error("failed to save upload")]
    SaveFile(#[source] std::io::Error),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("upstream request failed")]
    Upstream(#[from] reqwest::Error),
    #[error("malformed upstream response: {0}")]
    UpstreamFormat(String),
    #[error("serialization failed")]
    Serialization(#[from] serde_json::Error),
    #[error("{0} is not configured")]
    Disabled(&'static str),
}
