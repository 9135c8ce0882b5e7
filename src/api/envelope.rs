/// Uniform response envelope: `{status, message, data?}`
///
/// The error half of the envelope lives on `GateError`'s IntoResponse.
use serde::Serialize;

/// Success envelope without a payload
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: String,
    pub message: String,
}

/// Success envelope with a payload
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub status: String,
    pub message: String,
    pub data: T,
}

pub fn success(message: impl Into<String>) -> MessageResponse {
    MessageResponse {
        status: "success".to_string(),
        message: message.into(),
    }
}

pub fn success_with<T: Serialize>(data: T, message: impl Into<String>) -> DataResponse<T> {
    DataResponse {
        status: "success".to_string(),
        message: message.into(),
        data,
    }
}
