use actix_web::body::EitherBody;
use actix_web::{HttpResponse, Responder};
use serde::{Deserialize, Serialize};

/// Response code carried in the JSON envelope.
pub enum ResponseCode {
    Success = 0,
    Error = 500,
}

/// Standard envelope for all REST API endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebResponse<T> {
    pub code: u16,
    /// Human-readable message describing the result
    pub message: String,
    /// Payload data; present on success, absent on errors
    pub data: Option<T>,
}

impl<T> WebResponse<T> {
    /// Success response with data.
    pub fn ok(data: T) -> Self {
        Self {
            code: ResponseCode::Success as u16,
            message: "success".into(),
            data: Some(data),
        }
    }

    /// Empty success response.
    pub fn ok_empty() -> WebResponse<()> {
        WebResponse {
            code: ResponseCode::Success as u16,
            message: "success".into(),
            data: None,
        }
    }

    /// Error response with message.
    pub fn error(message: &str) -> Self {
        Self {
            code: ResponseCode::Error as u16,
            message: message.into(),
            data: None,
        }
    }
}

impl<T> Responder for WebResponse<T>
where
    T: Serialize,
{
    type Body = EitherBody<String>;

    fn respond_to(self, _req: &actix_web::HttpRequest) -> HttpResponse<EitherBody<String>> {
        HttpResponse::Ok()
            .content_type("application/json")
            .body(serde_json::to_string(&self).unwrap())
            .map_into_right_body()
    }
}
