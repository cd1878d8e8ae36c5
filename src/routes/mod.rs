use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde_json::json;

use crate::services::ServiceError;

pub mod main;

/// HTTP status carried by each service failure.
pub fn error_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation(_)
        | ServiceError::NoFiles
        | ServiceError::InvalidFileType(_)
        | ServiceError::Disabled(_) => StatusCode::BAD_REQUEST,
        ServiceError::JobNotFound | ServiceError::ProjectNotFound => StatusCode::NOT_FOUND,
        ServiceError::Upstream(_) | ServiceError::UpstreamFormat(_) => StatusCode::BAD_GATEWAY,
        ServiceError::PdfExtraction(_)
        | ServiceError::SaveFile(_)
        | ServiceError::Database(_)
        | ServiceError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl actix_web::error::ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        error_status(self)
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("request failed: {self}");
        }
        HttpResponse::build(self.status_code()).json(json!({"detail": self.to_string()}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::error::ResponseError;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ServiceError::Validation("empty".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_job_maps_to_not_found() {
        assert_eq!(ServiceError::JobNotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn upstream_format_maps_to_bad_gateway() {
        let err = ServiceError::UpstreamFormat("bad xml".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
