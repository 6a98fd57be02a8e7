//! The uniform `{success, data?, error?, metadata?}` response envelope
//! every handler renders through, and [`ApiError`]'s `axum::response::IntoResponse`
//! impl so a handler can simply return `Result<Json<T>, ApiError>`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::errors::ApiError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, metadata: None }
    }

    #[must_use]
    pub fn ok_with_metadata(data: T, metadata: Value) -> Self {
        Self { success: true, data: Some(data), error: None, metadata: Some(metadata) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody { code: self.code(), message: self.to_string() }),
            metadata: None,
        };
        (status, Json(body)).into_response()
    }
}
