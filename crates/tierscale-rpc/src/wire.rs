//! Request and response bodies shared by the routers and the clients.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use tierscale_core::{OpsError, Request, ServeOutcome, WorkerId};

/// Envelope for every response.
///
/// `data` is always written on success, even when it is `null`, so unit
/// and `Option` payloads survive the round trip.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestBody {
    pub request: Request,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerBody {
    pub worker: WorkerId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyBody {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetBody {
    pub key: String,
    pub value: String,
    pub auth: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionBody {
    pub item: String,
    pub price: f32,
    pub qty: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessBody {
    pub request: Request,
    pub outcome: ServeOutcome,
}

/// HTTP status a served operation error is reported with.
pub fn status_for(error: &OpsError) -> StatusCode {
    match error {
        OpsError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        OpsError::UnknownWorker(_) => StatusCode::NOT_FOUND,
        OpsError::Codec(_) => StatusCode::BAD_REQUEST,
        OpsError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        OpsError::Remote { .. } => StatusCode::BAD_GATEWAY,
        OpsError::Harness(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Rebuild an operation error from a failed response.
///
/// Only unsupported operations are recoverable from the status alone;
/// callers that know more (an unknown worker id) refine `Remote` further.
pub fn error_from(status: StatusCode, message: String) -> OpsError {
    match status {
        StatusCode::NOT_IMPLEMENTED => OpsError::Unsupported(message),
        _ => OpsError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}
