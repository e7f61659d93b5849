use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::backend::{BackendKind, ChatBackend, Completion, Fragment, FragmentStream};
use crate::chat::{ChatConfig, GenerationConfig};
use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_ERRORS,
    STREAM_FRAGMENTS, STREAM_TTFB,
};
use crate::sse::process_sse;
use crate::types::{ChatCompletion, ChatCompletionChunk, ChatCompletionParams, ModelList, Turn};

const DEFAULT_BASE_URL: &str = "http://localhost:9000";
const DEFAULT_MODEL: &str = "Medical_Qwen3_8B_Large_Language_Model";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const API_KEY_ENV: &str = "VLLM_API_KEY";

/// vLLM accepts any bearer token unless it was started with `--api-key`.
const PLACEHOLDER_API_KEY: &str = "EMPTY";

/// Client for a vLLM OpenAI-compatible inference server.
///
/// The client is stateless: every request carries the whole conversation.  Connections are
/// not pooled, so each request opens and closes its own.
#[derive(Clone)]
pub struct VllmClient {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    model: String,
    kind: BackendKind,
    timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl fmt::Debug for VllmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VllmClient")
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl VllmClient {
    /// Create a new client against the default local server.
    ///
    /// The API key can be provided directly or read from the VLLM_API_KEY environment
    /// variable; without either, the placeholder `EMPTY` is sent.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key
            .or_else(|| env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string());

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        let base_url = api_base(base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;

        Ok(Self {
            api_key,
            client,
            base_url,
            model: DEFAULT_MODEL.to_string(),
            kind: BackendKind::default(),
            timeout,
            logger: None,
        })
    }

    /// Create a client from a resolved chat configuration.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        Ok(Self::with_options(
            config.api_key.clone(),
            Some(config.base_url.clone()),
            Some(config.timeout),
        )?
        .with_model(config.model.clone())
        .with_kind(config.generation.backend()))
    }

    /// Set the served model name sent with every request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the transport kind.  Buffered clients refuse to stream.
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach a logger that sees every request, response and stream chunk.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The `/v1/` root all endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The served model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The transport kind.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|e| {
            Error::validation(
                format!("API key is not a valid header value: {e}"),
                Some("api_key".to_string()),
            )
        })?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::url(format!("Invalid endpoint {path}: {e}"), Some(e)))
    }

    fn params(&self, messages: &[Turn], config: &GenerationConfig) -> ChatCompletionParams {
        ChatCompletionParams::new(
            self.model.clone(),
            messages.to_vec(),
            config.max_tokens(),
            config.temperature(),
            config.top_p(),
        )
    }

    fn map_request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type.
    ///
    /// Understands both the OpenAI envelope `{"error": {...}}` and vLLM's flat
    /// `{"object": "error", "message": ...}` body.
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
            #[serde(flatten)]
            flat: ErrorDetail,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .map(|parsed| parsed.error.unwrap_or(parsed.flat));
        let error_type = detail.as_ref().and_then(|d| d.error_type.clone());
        let error_param = detail.as_ref().and_then(|d| d.param.clone());
        let error_message = detail
            .and_then(|d| d.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message, None, None),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    /// Send a chat-completions request and wait for the complete response.
    pub async fn create(&self, params: ChatCompletionParams) -> Result<ChatCompletion> {
        let url = self.endpoint("chat/completions")?;
        if let Some(logger) = &self.logger {
            logger.log_request(&params);
        }

        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = self.create_inner(url, &params).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        match result {
            Ok(completion) => {
                if let Some(logger) = &self.logger {
                    logger.log_response(&completion);
                }
                Ok(completion)
            }
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                tracing::warn!(error = %err, "chat completion request failed");
                Err(err)
            }
        }
    }

    async fn create_inner(&self, url: Url, params: &ChatCompletionParams) -> Result<ChatCompletion> {
        let response = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .timeout(self.timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<ChatCompletion>().await.map_err(|e| {
            if e.is_timeout() {
                self.map_request_error(e)
            } else {
                Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
            }
        })
    }

    /// Send a chat-completions request and get a streaming response.
    ///
    /// Returns a stream of text and usage fragments that can be processed incrementally.
    /// The request asks the server to append a usage chunk before `[DONE]`.
    pub async fn stream(&self, params: ChatCompletionParams) -> Result<FragmentStream> {
        let params = params.streaming();
        let url = self.endpoint("chat/completions")?;
        if let Some(logger) = &self.logger {
            logger.log_request(&params);
        }

        let mut headers = self.default_headers()?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = match self
            .client
            .post(url)
            .headers(headers)
            .json(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                CLIENT_REQUEST_ERRORS.click();
                return Err(self.map_request_error(e));
            }
        };

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::warn!(error = %err, "streaming request failed");
            return Err(err);
        }

        let logger = self.logger.clone();
        let mut first_fragment = true;
        let fragments = process_sse(response.bytes_stream())
            .map(move |chunk| match chunk {
                Ok(chunk) => {
                    if let Some(logger) = &logger {
                        logger.log_stream_chunk(&chunk);
                    }
                    let fragments = chunk_fragments(chunk);
                    if first_fragment && !fragments.is_empty() {
                        first_fragment = false;
                        STREAM_TTFB.add(start.elapsed().as_secs_f64());
                    }
                    STREAM_FRAGMENTS.count(fragments.len() as u64);
                    fragments.into_iter().map(Ok).collect::<Vec<_>>()
                }
                Err(err) => {
                    STREAM_ERRORS.click();
                    tracing::warn!(error = %err, "stream failed");
                    vec![Err(err)]
                }
            })
            .flat_map(stream::iter);

        Ok(Box::pin(fragments))
    }

    /// List the model ids the server serves.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.endpoint("models")?;
        let response = self
            .client
            .get(url)
            .headers(self.default_headers()?)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let models = response.json::<ModelList>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse model list: {e}"),
                Some(Box::new(e)),
            )
        })?;
        Ok(models.ids())
    }
}

#[async_trait::async_trait]
impl ChatBackend for VllmClient {
    fn supports_streaming(&self) -> bool {
        self.kind.supports_streaming()
    }

    async fn send(&self, messages: &[Turn], config: &GenerationConfig) -> Result<Completion> {
        let completion = self.create(self.params(messages, config)).await?;
        let text = completion.text().ok_or_else(|| {
            Error::serialization("Response contained no choices", None)
        })?;
        let mut result = Completion::new(text);
        if let Some(usage) = completion.usage {
            result = result.with_usage(usage);
        }
        Ok(result)
    }

    async fn send_streaming(
        &self,
        messages: &[Turn],
        config: &GenerationConfig,
    ) -> Result<FragmentStream> {
        if !self.supports_streaming() {
            return Err(Error::validation(
                format!("the {} backend cannot stream", self.kind),
                Some("stream".to_string()),
            ));
        }
        self.stream(self.params(messages, config)).await
    }
}

/// Split one chunk into the fragments it carries, text before usage.
fn chunk_fragments(chunk: ChatCompletionChunk) -> Vec<Fragment> {
    let mut fragments = Vec::with_capacity(2);
    if let Some(text) = chunk.text() {
        fragments.push(Fragment::Text(text.to_string()));
    }
    if let Some(usage) = chunk.usage {
        fragments.push(Fragment::Usage(usage));
    }
    fragments
}

/// Normalize a server address to the `/v1/` root.
///
/// `http://host:9000`, `http://host:9000/` and `http://host:9000/v1` all resolve to
/// `http://host:9000/v1/`.
fn api_base(base_url: &str) -> Result<Url> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/v1").unwrap_or(trimmed);
    Url::parse(&format!("{trimmed}/v1/"))
        .map_err(|e| Error::url(format!("Invalid base URL {base_url:?}: {e}"), Some(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = VllmClient::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url.as_str(), "http://localhost:9000/v1/");
        assert_eq!(client.model, DEFAULT_MODEL);
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
        assert!(client.supports_streaming());

        let client = VllmClient::with_options(
            Some("test-key".to_string()),
            Some("https://gpu.example.com:8000/".to_string()),
            Some(Duration::from_secs(30)),
        )
        .unwrap()
        .with_kind(BackendKind::Buffered);
        assert_eq!(client.base_url.as_str(), "https://gpu.example.com:8000/v1/");
        assert_eq!(client.timeout, Duration::from_secs(30));
        assert!(!client.supports_streaming());
    }

    #[test]
    fn base_url_normalization() {
        for input in [
            "http://localhost:9000",
            "http://localhost:9000/",
            "http://localhost:9000/v1",
            "http://localhost:9000/v1/",
        ] {
            assert_eq!(api_base(input).unwrap().as_str(), "http://localhost:9000/v1/");
        }
        assert_eq!(
            api_base("http://proxy/llm").unwrap().as_str(),
            "http://proxy/llm/v1/"
        );
        assert!(api_base("not a url").is_err());
    }

    #[test]
    fn endpoints_resolve_under_v1() {
        let client = VllmClient::new(Some("k".to_string())).unwrap();
        assert_eq!(
            client.endpoint("chat/completions").unwrap().as_str(),
            "http://localhost:9000/v1/chat/completions"
        );
        assert_eq!(
            client.endpoint("models").unwrap().as_str(),
            "http://localhost:9000/v1/models"
        );
    }

    #[test]
    fn bearer_header() {
        let client = VllmClient::new(Some("secret".to_string())).unwrap();
        let headers = client.default_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer secret");

        let client = VllmClient::new(Some("bad\nkey".to_string())).unwrap();
        assert!(client.default_headers().unwrap_err().is_validation());
    }

    #[test]
    fn params_carry_generation_config() {
        let client = VllmClient::new(Some("k".to_string()))
            .unwrap()
            .with_model("tiny");
        let mut config = GenerationConfig::new();
        config.set_max_tokens(64).unwrap();
        let params = client.params(&[Turn::user("hi")], &config);
        assert_eq!(params.model, "tiny");
        assert_eq!(params.max_tokens, 64);
        assert_eq!(params.messages.len(), 1);
        assert!(!params.stream);
    }

    #[test]
    fn chunk_fragments_text_then_usage() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices":[{"index":0,"delta":{"content":"hi"}}],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#,
        )
        .unwrap();
        let fragments = chunk_fragments(chunk);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], Fragment::Text("hi".to_string()));
        assert!(matches!(fragments[1], Fragment::Usage(u) if u.total_tokens == 2));

        let role_only: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#)
                .unwrap();
        assert!(chunk_fragments(role_only).is_empty());
    }

    #[tokio::test]
    async fn buffered_client_refuses_to_stream() {
        let client = VllmClient::new(Some("k".to_string()))
            .unwrap()
            .with_kind(BackendKind::Buffered);
        let err = client
            .send_streaming(&[Turn::user("hi")], &GenerationConfig::new())
            .await
            .err()
            .unwrap();
        assert!(err.is_validation());
    }
}
