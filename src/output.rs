//! Result persistence.
//!
//! Batch results land at `out_dir/{index:03}-{slug}.json` (or the job's
//! explicit `out` name) and are overwritten on rerun. Single-job downloads
//! refuse to overwrite without `--force`.

use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::SoraError;
use crate::jobs::JobSpec;
use crate::openai::{Variant, VideoApi};
use crate::orchestrator::SubmissionOutcome;

const SLUG_MAX_LEN: usize = 60;
const SLUG_SOURCE_CHARS: usize = 80;

/// Writes one JSON document per job into the batch output directory.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    out_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Deterministic result path for the job at 1-based `index`.
    pub fn path_for(&self, index: usize, job: &JobSpec) -> PathBuf {
        self.out_dir
            .join(job_file_name(index, &job.prompt, job.output_name.as_deref()))
    }

    /// Persists the raw record on success, or an error document on failure.
    pub async fn write(
        &self,
        index: usize,
        job: &JobSpec,
        outcome: &SubmissionOutcome,
    ) -> Result<PathBuf, SoraError> {
        let path = self.path_for(index, job);
        let document = match &outcome.result {
            Ok(record) => record.raw().clone(),
            Err(info) => json!({
                "job": index,
                "prompt": job.prompt,
                "error": info,
                "failed_at": Utc::now(),
            }),
        };
        write_json(&path, &document).await?;
        Ok(path)
    }
}

/// Lowercase, hyphen-separated, `[a-z0-9-]` only, at most 60 chars; `"job"` when nothing survives.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut gap = false;
    for c in text.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if gap && !slug.is_empty() {
                slug.push('-');
            }
            gap = false;
            slug.push(c);
        } else {
            gap = true;
        }
    }
    if slug.is_empty() {
        return "job".to_string();
    }
    slug.truncate(SLUG_MAX_LEN);
    slug
}

/// File name for a batch result. An explicit name keeps only its last
/// component and gains `.json` when it has no extension.
pub fn job_file_name(index: usize, prompt: &str, explicit: Option<&str>) -> String {
    if let Some(name) = explicit.and_then(|e| Path::new(e).file_name()) {
        let mut name = PathBuf::from(name);
        if name.extension().is_none() {
            name.set_extension("json");
        }
        return name.to_string_lossy().into_owned();
    }
    let head: String = prompt.chars().take(SLUG_SOURCE_CHARS).collect();
    format!("{index:03}-{}.json", slugify(&head))
}

/// Download destination for `variant`, suffixing the expected extension when missing.
pub fn normalize_out_path(out: Option<&str>, variant: Variant) -> PathBuf {
    let Some(out) = out.filter(|o| !o.is_empty()) else {
        return PathBuf::from(variant.default_file_name());
    };
    let path = PathBuf::from(out);
    let expected = variant.extension();
    match path.extension() {
        None => path.with_extension(&expected[1..]),
        Some(ext) => {
            let ext = format!(".{}", ext.to_string_lossy().to_ascii_lowercase());
            if ext != expected {
                warn!(
                    "Output extension {ext} does not match {expected} for {}.",
                    variant.as_str()
                );
            }
            path
        }
    }
}

/// Resolves `--json-out`. Directories (existing, or spelled with a trailing
/// separator) receive `default_name`; bare names gain `.json`.
pub fn normalize_json_out(out: Option<&str>, default_name: &str) -> Option<PathBuf> {
    let raw = out.filter(|o| !o.is_empty())?;
    if raw.ends_with('/') || raw.ends_with(MAIN_SEPARATOR) {
        return Some(Path::new(raw).join(default_name));
    }
    let path = PathBuf::from(raw);
    if path.is_dir() {
        return Some(path.join(default_name));
    }
    if path.extension().is_none() {
        return Some(path.with_extension("json"));
    }
    Some(path)
}

/// Pretty JSON (keys sorted), creating parent directories as needed.
pub async fn write_json(path: &Path, value: &Value) -> Result<(), SoraError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let text = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, text).await?;
    info!(path = %path.display(), "wrote");
    Ok(())
}

/// Sibling staging path for a download: `<out>.part`.
fn part_path(out_path: &Path) -> PathBuf {
    let mut name = out_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    out_path.with_file_name(name)
}

/// Downloads one artifact into `out_path`.
///
/// Bytes are streamed into `<out>.part` and renamed over `out_path` only
/// once the download succeeds, so a failed `--force` download leaves the
/// previous file untouched.
pub async fn write_download<C: VideoApi>(
    api: &C,
    id: &str,
    variant: Variant,
    out_path: &Path,
    force: bool,
) -> Result<u64, SoraError> {
    if out_path.exists() && !force {
        return Err(SoraError::OutputExists(out_path.to_path_buf()));
    }
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let part = part_path(out_path);
    let mut file = tokio::fs::File::create(&part).await?;
    match api.download_content(id, variant, &mut file).await {
        Ok(bytes) => {
            drop(file);
            if let Err(err) = tokio::fs::rename(&part, out_path).await {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(err.into());
            }
            info!(path = %out_path.display(), bytes, variant = variant.as_str(), "downloaded");
            Ok(bytes)
        }
        Err(err) => {
            drop(file);
            let _ = tokio::fs::remove_file(&part).await;
            Err(err.into())
        }
    }
}
