//! In-memory [`VideoApi`] for unit tests: scripted responses, call counters
//! and in-flight tracking. No sockets, so tests can run on a paused clock.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::openai::{ApiError, CreateVideoRequest, ListParams, Variant, VideoApi, VideoRecord};

type CreateFn = dyn Fn(&CreateVideoRequest, usize) -> Result<Value, ApiError> + Send + Sync;
type DelayFn = dyn Fn(&str) -> Duration + Send + Sync;

#[derive(Default)]
pub struct ScriptedApi {
    create: Option<Box<CreateFn>>,
    create_delay: Option<Box<DelayFn>>,
    statuses: Mutex<VecDeque<String>>,
    content: Vec<u8>,
    fail_download: bool,
    create_calls: AtomicUsize,
    retrieve_calls: AtomicUsize,
    remix_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedApi {
    /// Responder for create calls; receives the request and the 1-based call number.
    pub fn with_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&CreateVideoRequest, usize) -> Result<Value, ApiError> + Send + Sync + 'static,
    {
        self.create = Some(Box::new(f));
        self
    }

    pub fn with_create_delay(self, delay: Duration) -> Self {
        self.with_create_delay_fn(move |_| delay)
    }

    /// Per-prompt latency for create calls.
    pub fn with_create_delay_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Duration + Send + Sync + 'static,
    {
        self.create_delay = Some(Box::new(f));
        self
    }

    /// Statuses returned by successive retrieves; the last one repeats.
    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        *self.statuses.lock().unwrap() = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_content(mut self, bytes: &[u8]) -> Self {
        self.content = bytes.to_vec();
        self
    }

    /// Downloads write half of `content`, then fail with a 500.
    pub fn with_failing_download(mut self) -> Self {
        self.fail_download = true;
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub fn remix_calls(&self) -> usize {
        self.remix_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_status(&self) -> String {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses.front().cloned().unwrap_or_else(|| "completed".into())
        }
    }
}

impl VideoApi for ScriptedApi {
    async fn create(&self, request: &CreateVideoRequest) -> Result<VideoRecord, ApiError> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = &self.create_delay {
            tokio::time::sleep(delay(&request.prompt)).await;
        }
        let response = match &self.create {
            Some(f) => f(request, call),
            None => Ok(json!({
                "id": format!("video_{call}"),
                "status": "queued",
                "prompt": request.prompt,
            })),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response.map(VideoRecord::new)
    }

    async fn retrieve(&self, id: &str) -> Result<VideoRecord, ApiError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(VideoRecord::new(json!({"id": id, "status": self.next_status()})))
    }

    async fn list(&self, params: &ListParams) -> Result<Value, ApiError> {
        Ok(json!({"object": "list", "data": [], "limit": params.limit}))
    }

    async fn delete(&self, id: &str) -> Result<Value, ApiError> {
        Ok(json!({"id": id, "deleted": true}))
    }

    async fn remix(&self, id: &str, prompt: &str) -> Result<VideoRecord, ApiError> {
        self.remix_calls.fetch_add(1, Ordering::SeqCst);
        Ok(VideoRecord::new(json!({
            "id": format!("{id}_remix"),
            "status": "queued",
            "remixed_from_video_id": id,
            "prompt": prompt,
        })))
    }

    async fn download_content<W>(
        &self,
        _id: &str,
        _variant: Variant,
        sink: &mut W,
    ) -> Result<u64, ApiError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if self.fail_download {
            sink.write_all(&self.content[..self.content.len() / 2]).await?;
            return Err(ApiError::Status {
                status: 500,
                message: "stream interrupted".into(),
            });
        }
        sink.write_all(&self.content).await?;
        sink.flush().await?;
        Ok(self.content.len() as u64)
    }
}
