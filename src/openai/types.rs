//! Tipos de dados para requisições e respostas da Video API.
//!
//! O registro de job remoto é tratado como um documento opaco
//! ([`VideoRecord`]) com acessores tolerantes: `id` e `status` são procurados
//! no nível superior e, em seguida, dentro de `data`. Assim, mudanças de
//! formato no serviço remoto não exigem mudanças estruturais aqui.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Status values after which a job makes no further progress.
pub const TERMINAL_STATUSES: [JobStatus; 3] =
    [JobStatus::Completed, JobStatus::Failed, JobStatus::Canceled];

/// Lifecycle status of a remote video job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Canceled,
    /// Missing or unrecognized status. Never terminal.
    Unknown,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => JobStatus::Queued,
            "processing" | "in_progress" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "canceled" | "cancelled" => JobStatus::Canceled,
            _ => JobStatus::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        TERMINAL_STATUSES.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a remote job, kept as the raw JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoRecord(Value);

impl VideoRecord {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn into_raw(self) -> Value {
        self.0
    }

    pub fn id(&self) -> Option<&str> {
        self.lookup_str(&["id"])
    }

    /// Reads `status` (or `state`); absent or unknown values map to [`JobStatus::Unknown`].
    pub fn status(&self) -> JobStatus {
        self.lookup_str(&["status", "state"])
            .map(JobStatus::parse)
            .unwrap_or(JobStatus::Unknown)
    }

    // Top level first, then one level down under `data`.
    fn lookup_str(&self, keys: &[&str]) -> Option<&str> {
        let top = self.0.as_object()?;
        find_str(top, keys).or_else(|| {
            top.get("data")
                .and_then(Value::as_object)
                .and_then(|data| find_str(data, keys))
        })
    }
}

fn find_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
}

/// Supported generation models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    Sora2,
    Sora2Pro,
}

impl Model {
    pub const ALL: [Model; 2] = [Model::Sora2, Model::Sora2Pro];

    pub fn as_str(self) -> &'static str {
        match self {
            Model::Sora2 => "sora-2",
            Model::Sora2Pro => "sora-2-pro",
        }
    }

    /// Output sizes the API accepts for this model.
    pub fn allowed_sizes(self) -> &'static [&'static str] {
        match self {
            Model::Sora2 => &["1280x720", "720x1280"],
            Model::Sora2Pro => &["1280x720", "720x1280", "1024x1792", "1792x1024"],
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Clip duration. The API takes it as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seconds {
    Four,
    Eight,
    Twelve,
}

impl Seconds {
    pub const ALL: [Seconds; 3] = [Seconds::Four, Seconds::Eight, Seconds::Twelve];

    pub fn as_str(self) -> &'static str {
        match self {
            Seconds::Four => "4",
            Seconds::Eight => "8",
            Seconds::Twelve => "12",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim();
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl Serialize for Seconds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Corpo de criação de um vídeo, já validado.
///
/// `input_reference` é um caminho local enviado como parte multipart;
/// não aparece no JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateVideoRequest {
    pub model: Model,
    pub prompt: String,
    pub size: String,
    pub seconds: Seconds,
    #[serde(skip)]
    pub input_reference: Option<PathBuf>,
}

impl CreateVideoRequest {
    /// The request as it would be sent, for dry-run previews.
    pub fn preview(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let (Some(map), Some(path)) = (value.as_object_mut(), &self.input_reference) {
            map.insert(
                "input_reference".into(),
                Value::String(path.display().to_string()),
            );
        }
        value
    }
}

/// Downloadable artifacts of a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Video,
    Thumbnail,
    Spritesheet,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Video, Variant::Thumbnail, Variant::Spritesheet];

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Video => "video",
            Variant::Thumbnail => "thumbnail",
            Variant::Spritesheet => "spritesheet",
        }
    }

    /// Expected file extension, including the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Variant::Video => ".mp4",
            Variant::Thumbnail => ".webp",
            Variant::Spritesheet => ".jpg",
        }
    }

    pub fn default_file_name(self) -> String {
        format!("{}{}", self.as_str(), self.extension())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|v| v.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    Asc,
    Desc,
}

impl ListOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            ListOrder::Asc => "asc",
            ListOrder::Desc => "desc",
        }
    }
}

/// Filters for listing jobs. `None` fields are left out of the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub order: Option<ListOrder>,
    pub after: Option<String>,
    pub before: Option<String>,
}

impl ListParams {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(order) = self.order {
            query.push(("order", order.as_str().to_string()));
        }
        if let Some(after) = &self.after {
            query.push(("after", after.clone()));
        }
        if let Some(before) = &self.before {
            query.push(("before", before.clone()));
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_and_id_read_from_top_level() {
        let record = VideoRecord::new(json!({"id": "video_1", "status": "in_progress"}));
        assert_eq!(record.id(), Some("video_1"));
        assert_eq!(record.status(), JobStatus::Processing);
    }

    #[test]
    fn status_and_id_read_from_nested_data() {
        let record = VideoRecord::new(json!({"data": {"id": "video_2", "state": "completed"}}));
        assert_eq!(record.id(), Some("video_2"));
        assert_eq!(record.status(), JobStatus::Completed);
    }

    #[test]
    fn missing_or_unrecognized_status_is_unknown() {
        assert_eq!(VideoRecord::new(json!({"id": "x"})).status(), JobStatus::Unknown);
        assert_eq!(
            VideoRecord::new(json!({"status": "warming_up"})).status(),
            JobStatus::Unknown
        );
        assert_eq!(VideoRecord::new(json!({"status": 3})).status(), JobStatus::Unknown);
        assert!(!JobStatus::Unknown.is_terminal());
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert_eq!(JobStatus::parse("cancelled"), JobStatus::Canceled);
    }

    #[test]
    fn model_sizes_and_parsing() {
        assert_eq!(Model::parse(" SORA-2-Pro "), Some(Model::Sora2Pro));
        assert_eq!(Model::parse("sora-3"), None);
        assert!(!Model::Sora2.allowed_sizes().contains(&"1792x1024"));
        assert!(Model::Sora2Pro.allowed_sizes().contains(&"1792x1024"));
    }

    #[test]
    fn create_request_serializes_seconds_as_string() {
        let req = CreateVideoRequest {
            model: Model::Sora2,
            prompt: "a cat".into(),
            size: "1280x720".into(),
            seconds: Seconds::Eight,
            input_reference: Some(PathBuf::from("ref.png")),
        };
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            json!({"model": "sora-2", "prompt": "a cat", "size": "1280x720", "seconds": "8"})
        );
        assert_eq!(req.preview()["input_reference"], "ref.png");
    }

    #[test]
    fn variant_extensions() {
        assert_eq!(Variant::Video.extension(), ".mp4");
        assert_eq!(Variant::Thumbnail.default_file_name(), "thumbnail.webp");
        assert_eq!(Variant::parse("SpriteSheet"), Some(Variant::Spritesheet));
        assert_eq!(Variant::parse("gif"), None);
    }

    #[test]
    fn list_params_skip_absent_filters() {
        let params = ListParams {
            limit: Some(5),
            order: Some(ListOrder::Desc),
            ..Default::default()
        };
        assert_eq!(
            params.query(),
            vec![("limit", "5".to_string()), ("order", "desc".to_string())]
        );
    }
}
