use std::path::Path;

use tracing::warn;

use super::prompt::{PromptFields, augment_prompt};
use super::source::JobSpec;
use crate::error::SoraError;
use crate::openai::{CreateVideoRequest, Model, Seconds};

const ALLOWED_INPUT_EXTS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Batch-wide defaults, resolved once from config and CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDefaults {
    pub model: String,
    pub size: String,
    pub seconds: String,
    pub fields: PromptFields,
    pub augment: bool,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            model: Model::Sora2.as_str().to_string(),
            size: "1280x720".to_string(),
            seconds: Seconds::Four.as_str().to_string(),
            fields: PromptFields::default(),
            augment: true,
        }
    }
}

/// Builds a validated create request from a job and the batch defaults.
///
/// Merge order: defaults < job overrides, for both payload values and
/// augmentation fields. Nothing here touches the network.
pub fn build(job: &JobSpec, defaults: &BatchDefaults) -> Result<CreateVideoRequest, SoraError> {
    let fields = defaults.fields.merged(&job.fields);
    let prompt = augment_prompt(defaults.augment, &job.prompt, &fields);

    let model = normalize_model(job.overrides.model.as_deref().unwrap_or(&defaults.model))?;
    let size = normalize_size(
        job.overrides.size.as_deref().unwrap_or(&defaults.size),
        model,
    )?;
    let seconds = normalize_seconds(
        job.overrides
            .seconds
            .as_deref()
            .unwrap_or(&defaults.seconds),
    )?;

    if let Some(path) = &job.input_reference {
        check_input_reference(path)?;
    }

    Ok(CreateVideoRequest {
        model,
        prompt,
        size,
        seconds,
        input_reference: job.input_reference.clone(),
    })
}

/// Builds every payload up front so one bad job aborts the batch before any call.
pub fn build_all(
    jobs: &[JobSpec],
    defaults: &BatchDefaults,
) -> Result<Vec<CreateVideoRequest>, SoraError> {
    jobs.iter().map(|job| build(job, defaults)).collect()
}

pub fn normalize_model(raw: &str) -> Result<Model, SoraError> {
    Model::parse(raw).ok_or_else(|| {
        let allowed: Vec<&str> = Model::ALL.iter().map(|m| m.as_str()).collect();
        SoraError::invalid_payload("model", raw, &allowed)
    })
}

pub fn normalize_size(raw: &str, model: Model) -> Result<String, SoraError> {
    let value = raw.trim().to_ascii_lowercase();
    let allowed = model.allowed_sizes();
    if allowed.contains(&value.as_str()) {
        Ok(value)
    } else {
        let mut sorted = allowed.to_vec();
        sorted.sort_unstable();
        Err(SoraError::InvalidPayload {
            field: "size",
            value: raw.to_string(),
            allowed: format!("{} for model {}", sorted.join(", "), model.as_str()),
        })
    }
}

pub fn normalize_seconds(raw: &str) -> Result<Seconds, SoraError> {
    Seconds::parse(raw).ok_or_else(|| {
        let allowed: Vec<&str> = Seconds::ALL.iter().map(|s| s.as_str()).collect();
        SoraError::invalid_payload("seconds", raw, &allowed)
    })
}

fn check_input_reference(path: &Path) -> Result<(), SoraError> {
    if !path.exists() {
        return Err(SoraError::InputReferenceNotFound(path.to_path_buf()));
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_INPUT_EXTS.contains(&ext.as_str()) {
        warn!(path = %path.display(), "input reference should be jpeg, png, or webp");
    }
    Ok(())
}
