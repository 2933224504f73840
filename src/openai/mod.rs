pub mod client;
pub mod error;
pub mod types;

pub use client::OpenAiVideoClient;
pub use error::{ApiError, ErrorClass};
pub use types::{
    CreateVideoRequest, JobStatus, ListOrder, ListParams, Model, Seconds, Variant, VideoRecord,
};

use serde_json::Value;
use tokio::io::AsyncWrite;

/// Operations of the remote video-job service.
///
/// Futures are `Send` so submissions can run as spawned tasks.
pub trait VideoApi: Send + Sync {
    fn create(
        &self,
        request: &CreateVideoRequest,
    ) -> impl Future<Output = Result<VideoRecord, ApiError>> + Send;

    fn retrieve(&self, id: &str) -> impl Future<Output = Result<VideoRecord, ApiError>> + Send;

    fn list(&self, params: &ListParams) -> impl Future<Output = Result<Value, ApiError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<Value, ApiError>> + Send;

    fn remix(
        &self,
        id: &str,
        prompt: &str,
    ) -> impl Future<Output = Result<VideoRecord, ApiError>> + Send;

    /// Streams one artifact of a job into `sink`, returning the byte count.
    fn download_content<W>(
        &self,
        id: &str,
        variant: Variant,
        sink: &mut W,
    ) -> impl Future<Output = Result<u64, ApiError>> + Send
    where
        W: AsyncWrite + Unpin + Send;
}
