use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::VideoApi;
use super::error::{ApiError, parse_delay_ms, parse_delay_secs};
use super::types::{CreateVideoRequest, ListParams, Variant, VideoRecord};

const API_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiVideoClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl OpenAiVideoClient {
    pub fn new(api_key: String) -> Result<Self, ApiError> {
        Self::with_base_url(api_key, API_URL.to_string())
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
    }

    async fn create_form(request: &CreateVideoRequest, path: &Path) -> Result<Form, ApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ApiError::InputReference {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input_reference".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(path))?;

        Ok(Form::new()
            .text("model", request.model.as_str())
            .text("prompt", request.prompt.clone())
            .text("size", request.size.clone())
            .text("seconds", request.seconds.as_str())
            .part("input_reference", part))
    }
}

impl VideoApi for OpenAiVideoClient {
    async fn create(&self, request: &CreateVideoRequest) -> Result<VideoRecord, ApiError> {
        let builder = self.request(reqwest::Method::POST, "/videos");
        let builder = match &request.input_reference {
            Some(path) => builder.multipart(Self::create_form(request, path).await?),
            None => builder.json(request),
        };
        let response = check(builder.send().await?).await?;
        read_json(response).await.map(VideoRecord::new)
    }

    async fn retrieve(&self, id: &str) -> Result<VideoRecord, ApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/videos/{id}"))
            .send()
            .await?;
        read_json(check(response).await?).await.map(VideoRecord::new)
    }

    async fn list(&self, params: &ListParams) -> Result<Value, ApiError> {
        let response = self
            .request(reqwest::Method::GET, "/videos")
            .query(&params.query())
            .send()
            .await?;
        read_json(check(response).await?).await
    }

    async fn delete(&self, id: &str) -> Result<Value, ApiError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/videos/{id}"))
            .send()
            .await?;
        read_json(check(response).await?).await
    }

    async fn remix(&self, id: &str, prompt: &str) -> Result<VideoRecord, ApiError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/videos/{id}/remix"))
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;
        read_json(check(response).await?).await.map(VideoRecord::new)
    }

    async fn download_content<W>(
        &self,
        id: &str,
        variant: Variant,
        sink: &mut W,
    ) -> Result<u64, ApiError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let response = self
            .request(reqwest::Method::GET, &format!("/videos/{id}/content"))
            .query(&[("variant", variant.as_str())])
            .send()
            .await?;
        let mut response = check(response).await?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }
}

/// Maps non-2xx responses to typed errors, keeping the body as the message.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after_header(&response);
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
            retry_after,
            message,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ApiError::Timeout(format!("status {}: {message}", status.as_u16()))
        }
        _ => ApiError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

async fn read_json(response: Response) -> Result<Value, ApiError> {
    response
        .json::<Value>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

// `retry-after-ms` is more precise when the server sends both.
fn retry_after_header(response: &Response) -> Option<Duration> {
    let headers = response.headers();
    header_str(headers, "retry-after-ms")
        .and_then(parse_delay_ms)
        .or_else(|| header_str(headers, "retry-after").and_then(parse_delay_secs))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
