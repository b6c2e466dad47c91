use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Query parameter accepted as a fallback carrier for the API key
pub const API_KEY_QUERY_PARAM: &str = "apikey";

/// API key middleware
///
/// When key checking is enabled, the request must carry the configured key in
/// the configured header (or, as a fallback, in the `apikey` query
/// parameter). On mismatch or absence the request is rejected with 401 before
/// any handler runs. When disabled, every request passes through.
pub async fn api_key_middleware(request: Request, next: Next) -> Result<Response, AuthError> {
    // The router injects the key configuration into request extensions
    let config = request
        .extensions()
        .get::<ApiKeyConfig>()
        .cloned()
        .ok_or(AuthError::ConfigurationError)?;

    if !config.required {
        return Ok(next.run(request).await);
    }

    let supplied = request
        .headers()
        .get(config.header.as_str())
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
        .or_else(|| api_key_from_query(request.uri().query()));

    match supplied {
        Some(key) if key == config.key => Ok(next.run(request).await),
        Some(_) => Err(AuthError::InvalidKey),
        None => Err(AuthError::MissingKey),
    }
}

/// Extract the API key from the raw query string, if present
fn api_key_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == API_KEY_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// API key configuration injected into request extensions by the router
#[derive(Clone, Debug)]
pub struct ApiKeyConfig {
    pub required: bool,
    pub key: String,
    pub header: String,
}

impl ApiKeyConfig {
    pub fn new(required: bool, key: String, header: String) -> Self {
        Self { required, key, header }
    }
}

/// Authentication errors
#[derive(Debug)]
pub enum AuthError {
    /// No API key supplied in header or query parameter
    MissingKey,
    /// Supplied key does not match the configured value
    InvalidKey,
    /// Key configuration not found in request extensions
    ConfigurationError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AuthError::MissingKey => (StatusCode::UNAUTHORIZED, "Missing API key"),
            AuthError::InvalidKey => (StatusCode::UNAUTHORIZED, "Invalid API key"),
            AuthError::ConfigurationError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication configuration error",
            ),
        };

        let body = Json(json!({
            "error": "Unauthorized",
            "message": error_message,
        }));

        (status, body).into_response()
    }
}
