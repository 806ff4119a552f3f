use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use shared_config::AppConfig;

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Invalid client configuration: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// PostgREST error payload.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    code: Option<String>,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", header_value(&self.api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Requests without a caller token run with the service key.
        let bearer = auth_token.unwrap_or(&self.api_key);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", bearer))?);

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let (data, _) = self
            .send(method, path, auth_token, body, extra_headers)
            .await?;
        Ok(data)
    }

    /// Runs a GET with `Prefer: count=exact` and returns the rows together
    /// with the total row count reported in `Content-Range`.
    pub async fn request_with_count<T>(
        &self,
        path: &str,
        auth_token: Option<&str>,
    ) -> Result<(T, Option<u64>), SupabaseError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        self.send(Method::GET, path, auth_token, None, Some(headers)).await
    }

    /// Calls a Postgres function exposed under `/rest/v1/rpc/`.
    pub async fn rpc<T>(
        &self,
        function: &str,
        args: Value,
        auth_token: Option<&str>,
    ) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, auth_token, Some(args)).await
    }

    async fn send<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<(T, Option<u64>), SupabaseError>
    where
        T: DeserializeOwned,
    {
        if self.base_url.is_empty() {
            return Err(SupabaseError::Config("SUPABASE_URL is empty".to_string()));
        }

        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(classify_failure(status, &error_text));
        }

        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total);

        let bytes = response.bytes().await?;
        // PostgREST answers 204 with an empty body when no representation is requested.
        let data = if bytes.is_empty() {
            serde_json::from_value(Value::Null)?
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok((data, total))
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, SupabaseError> {
    HeaderValue::from_str(raw)
        .map_err(|e| SupabaseError::Config(format!("invalid header value: {}", e)))
}

fn classify_failure(status: StatusCode, body: &str) -> SupabaseError {
    let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| body.to_string());
    let code = parsed.and_then(|e| e.code);

    match status.as_u16() {
        401 | 403 => {
            warn!("Supabase rejected credentials ({}): {}", status, message);
            SupabaseError::Auth(message)
        }
        404 => SupabaseError::NotFound(message),
        409 => {
            debug!("Supabase reported conflict (code {:?}): {}", code, message);
            SupabaseError::Conflict(message)
        }
        _ => {
            error!("API error ({}): {}", status, message);
            SupabaseError::Api { status: status.as_u16(), message }
        }
    }
}

/// `Content-Range: 0-24/3573` or `*/0` -> the total after the slash.
fn parse_content_range_total(raw: &str) -> Option<u64> {
    raw.rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SupabaseClient {
        let config = AppConfig {
            supabase_url: server.uri(),
            supabase_anon_key: "anon".to_string(),
            supabase_service_key: "service".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            ..AppConfig::default()
        };
        SupabaseClient::new(&config)
    }

    #[test]
    fn parses_content_range() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
    }

    #[tokio::test]
    async fn sends_service_key_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/pets"))
            .and(header("apikey", "service"))
            .and(header("authorization", "Bearer service"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;

        let rows: Vec<Value> = client_for(&server)
            .request(Method::GET, "/rest/v1/pets", None, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn maps_conflict_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/book_appointment"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "PT409",
                "message": "appointment conflict"
            })))
            .mount(&server)
            .await;

        let result: Result<Value, _> = client_for(&server)
            .rpc("book_appointment", json!({}), None)
            .await;
        assert_matches!(result, Err(SupabaseError::Conflict(msg)) if msg == "appointment conflict");
    }

    #[tokio::test]
    async fn reads_exact_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(header("prefer", "count=exact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-range", "0-0/42")
                    .set_body_json(json!([{"id": "a"}])),
            )
            .mount(&server)
            .await;

        let (rows, total): (Vec<Value>, _) = client_for(&server)
            .request_with_count("/rest/v1/appointments", None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(total, Some(42));
    }
}
