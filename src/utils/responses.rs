//! HTTP response handling
//!
//! Every error leaves the service as `{error, error_description}` JSON with a
//! status that tells the caller which side failed.

use actix_web::{http::header, http::StatusCode, HttpResponse};
use serde_json::json;

/// Unified response builder for handler results
pub struct ResponseBuilder;

impl ResponseBuilder {
    // ===============================
    // ERROR RESPONSE METHODS
    // ===============================

    /// Create a `BadRequest` (400) error response with optional customization
    #[must_use]
    pub fn bad_request() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::BadRequest)
    }

    /// Create a `Forbidden` (403) error response with optional customization
    #[must_use]
    pub fn forbidden() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::Forbidden)
    }

    /// Create an `UnprocessableEntity` (422) error response with optional customization
    #[must_use]
    pub fn unprocessable_entity() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::UnprocessableEntity)
    }

    /// Create an `InternalServerError` (500) error response with optional customization
    #[must_use]
    pub fn internal_server_error() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::InternalServerError)
    }

    /// Create a `BadGateway` (502) error response with optional customization
    #[must_use]
    pub fn bad_gateway() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::BadGateway)
    }

    /// Create a `GatewayTimeout` (504) error response with optional customization
    #[must_use]
    pub fn gateway_timeout() -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(ErrorType::GatewayTimeout)
    }

    // ===============================
    // SUCCESS RESPONSE METHODS
    // ===============================

    /// Create an OK response (200) with JSON content
    #[must_use]
    pub fn ok() -> JsonResponseBuilder {
        JsonResponseBuilder::new(StatusCode::OK)
    }

    // ===============================
    // CONVENIENCE METHODS
    // ===============================

    /// Common validation error: invalid field
    #[must_use]
    pub fn invalid_field(field_name: &str, reason: &str) -> HttpResponse {
        Self::bad_request()
            .with_error_code("invalid_field")
            .with_message(&format!("Invalid {field_name}: {reason}"))
            .build()
    }

    #[must_use]
    pub fn registration_rejected(reason: &str) -> HttpResponse {
        Self::bad_request()
            .with_error_code("registration_rejected")
            .with_message(reason)
            .build()
    }

    /// The custody service failed or could not be reached
    #[must_use]
    pub fn custody_unavailable() -> HttpResponse {
        Self::bad_gateway()
            .with_error_code("custody_error")
            .with_message("The key custody service did not complete the request")
            .build()
    }

    #[must_use]
    pub fn custody_timeout() -> HttpResponse {
        Self::gateway_timeout()
            .with_error_code("custody_timeout")
            .with_message("Timed out waiting for the key custody service")
            .build()
    }
}

/// Supported HTTP error response types
#[derive(Clone, Copy)]
enum ErrorType {
    BadRequest,
    Forbidden,
    UnprocessableEntity,
    InternalServerError,
    BadGateway,
    GatewayTimeout,
}

impl ErrorType {
    fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn default_error_code(self) -> &'static str {
        match self {
            Self::BadRequest => "invalid_request",
            Self::Forbidden => "forbidden",
            Self::UnprocessableEntity => "unprocessable",
            Self::InternalServerError => "server_error",
            Self::BadGateway => "bad_gateway",
            Self::GatewayTimeout => "gateway_timeout",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            Self::BadRequest => "The request is malformed or invalid",
            Self::Forbidden => "The operation was not authorized",
            Self::UnprocessableEntity => "The result could not be accepted",
            Self::InternalServerError => "An internal server error occurred",
            Self::BadGateway => "Failed to get a valid response from upstream",
            Self::GatewayTimeout => "Upstream did not respond in time",
        }
    }
}

/// Builder for error responses with fluent interface
pub struct ErrorResponseBuilder {
    error_type: ErrorType,
    error_code: Option<String>,
    message: Option<String>,
}

impl ErrorResponseBuilder {
    fn new(error_type: ErrorType) -> Self {
        Self {
            error_type,
            error_code: None,
            message: None,
        }
    }

    /// Set a custom error code (e.g., "`invalid_field`", "`signing_rejected`")
    #[must_use]
    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    /// Set a custom error message
    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    /// Build the final `HttpResponse`
    #[must_use]
    pub fn build(self) -> HttpResponse {
        let error = self
            .error_code
            .unwrap_or_else(|| self.error_type.default_error_code().to_string());
        let description = self
            .message
            .unwrap_or_else(|| self.error_type.default_message().to_string());

        HttpResponse::build(self.error_type.status())
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .json(json!({
                "error": error,
                "error_description": description,
            }))
    }
}

/// Builder for JSON responses
pub struct JsonResponseBuilder {
    status_code: StatusCode,
    headers: Vec<(String, String)>,
}

impl JsonResponseBuilder {
    fn new(status_code: StatusCode) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
        }
    }

    /// Add a custom header
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Build the response with JSON content
    #[must_use]
    pub fn json<T: serde::Serialize>(self, data: &T) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code);
        for (name, value) in self.headers {
            builder.insert_header((name, value));
        }
        builder.json(data)
    }
}
