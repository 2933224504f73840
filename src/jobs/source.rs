//! Batch input parsing.
//!
//! One job per non-blank, non-comment line: either a bare prompt or a
//! single-line JSON object carrying at least `prompt`.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::prompt::PromptFields;
use crate::error::SoraError;

/// Upper bound on jobs in one batch file.
pub const MAX_BATCH_JOBS: usize = 200;

const INPUT_REFERENCE_KEYS: [&str; 3] = [
    "input_reference",
    "input_reference_path",
    "input_reference_file",
];

/// Per-job payload overrides. Unset values fall back to batch defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadOverrides {
    pub model: Option<String>,
    pub size: Option<String>,
    pub seconds: Option<String>,
}

/// One parsed job. Immutable after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Trimmed, never empty.
    pub prompt: String,
    pub fields: PromptFields,
    pub overrides: PayloadOverrides,
    pub input_reference: Option<PathBuf>,
    /// Explicit result file name (`out` key).
    pub output_name: Option<String>,
    /// 1-based line in the input file.
    pub line: usize,
}

impl JobSpec {
    /// A job carrying only a prompt, as produced by a bare-text line.
    pub fn from_prompt(prompt: &str, line: usize) -> Result<Self, SoraError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SoraError::InvalidJobRecord {
                index: line,
                reason: "empty prompt".into(),
            });
        }
        Ok(Self {
            prompt: prompt.to_string(),
            fields: PromptFields::default(),
            overrides: PayloadOverrides::default(),
            input_reference: None,
            output_name: None,
            line,
        })
    }

    fn from_object(object: &Map<String, Value>, line: usize) -> Result<Self, SoraError> {
        let invalid = |reason: String| SoraError::InvalidJobRecord {
            index: line,
            reason,
        };

        let prompt = match object.get("prompt") {
            Some(Value::String(p)) if !p.trim().is_empty() => p.trim().to_string(),
            Some(Value::String(_)) => return Err(invalid("empty prompt".into())),
            Some(_) => return Err(invalid("prompt must be a string".into())),
            None => return Err(invalid("missing prompt".into())),
        };

        let mut fields = PromptFields::default();
        match object.get("fields") {
            None | Some(Value::Null) => {}
            Some(Value::Object(raw)) => {
                for (key, value) in raw {
                    if let Some(text) = scalar_text(value).map_err(|r| invalid(format!("fields.{key} {r}")))? {
                        fields.set(key.clone(), text);
                    }
                }
            }
            Some(_) => return Err(invalid("fields must be an object".into())),
        }
        // Top-level augmentation keys override the `fields` object.
        for (key, value) in object {
            if PromptFields::is_known(key) {
                if let Some(text) = scalar_text(value).map_err(|r| invalid(format!("{key} {r}")))? {
                    fields.set(key.clone(), text);
                }
            }
        }

        let text_key = |key: &str| {
            object
                .get(key)
                .map(scalar_text)
                .transpose()
                .map(Option::flatten)
                .map_err(|r| invalid(format!("{key} {r}")))
        };

        let overrides = PayloadOverrides {
            model: text_key("model")?,
            size: text_key("size")?,
            seconds: text_key("seconds")?,
        };

        let mut input_reference = None;
        for key in INPUT_REFERENCE_KEYS {
            if let Some(path) = text_key(key)? {
                input_reference = Some(PathBuf::from(path));
                break;
            }
        }

        Ok(Self {
            prompt,
            fields,
            overrides,
            input_reference,
            output_name: text_key("out")?,
            line,
        })
    }
}

// Strings and numbers become text, null means "unset", anything else is rejected.
fn scalar_text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err("must be a string".into()),
    }
}

/// Parses newline-delimited batch input into job specs.
///
/// Lines starting with `{` or `[` are JSON; everything else is a bare prompt.
pub fn parse_batch(input: &str) -> Result<Vec<JobSpec>, SoraError> {
    let mut jobs = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let job = if line.starts_with('{') || line.starts_with('[') {
            let value: Value =
                serde_json::from_str(line).map_err(|e| SoraError::MalformedInput {
                    line: line_no,
                    message: e.to_string(),
                })?;
            match value {
                Value::Object(object) => JobSpec::from_object(&object, line_no)?,
                _ => {
                    return Err(SoraError::InvalidJobRecord {
                        index: line_no,
                        reason: "expected string or object".into(),
                    });
                }
            }
        } else {
            JobSpec::from_prompt(line, line_no)?
        };
        jobs.push(job);
    }

    if jobs.is_empty() {
        return Err(SoraError::EmptyBatch);
    }
    if jobs.len() > MAX_BATCH_JOBS {
        return Err(SoraError::BatchTooLarge {
            count: jobs.len(),
            max: MAX_BATCH_JOBS,
        });
    }
    Ok(jobs)
}

/// Reads and parses a batch file.
pub fn read_batch_file(path: &Path) -> Result<Vec<JobSpec>, SoraError> {
    if !path.exists() {
        return Err(SoraError::InvalidOption(format!(
            "Input file not found: {}",
            path.display()
        )));
    }
    let contents = std::fs::read_to_string(path)?;
    parse_batch(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_non_blank_non_comment_lines() {
        let input = "\n# header comment\na cat on a skateboard\n   \n{\"prompt\": \"a dog surfing\"}\n  # indented comment\nthird\n";
        let jobs = parse_batch(input).unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].prompt, "a cat on a skateboard");
        assert_eq!(jobs[0].line, 3);
        assert_eq!(jobs[1].prompt, "a dog surfing");
        assert_eq!(jobs[1].line, 5);
        assert_eq!(jobs[2].line, 7);
    }

    #[test]
    fn every_size_up_to_the_limit_parses() {
        for n in [1usize, 2, 57, MAX_BATCH_JOBS] {
            let input: String = (0..n).map(|i| format!("prompt {i}\n# skip\n\n")).collect();
            assert_eq!(parse_batch(&input).unwrap().len(), n);
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(parse_batch(""), Err(SoraError::EmptyBatch)));
        assert!(matches!(
            parse_batch("# only comments\n\n"),
            Err(SoraError::EmptyBatch)
        ));
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let input: String = (0..=MAX_BATCH_JOBS).map(|i| format!("p{i}\n")).collect();
        match parse_batch(&input) {
            Err(SoraError::BatchTooLarge { count, max }) => {
                assert_eq!(count, 201);
                assert_eq!(max, 200);
            }
            other => panic!("expected BatchTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_reports_line_number() {
        let input = "ok prompt\n{\"prompt\": \"unterminated\n";
        match parse_batch(input) {
            Err(SoraError::MalformedInput { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected MalformedInput, got {other:?}"),
        }
    }

    #[test]
    fn structured_record_requires_prompt() {
        let err = parse_batch("first\n{\"scene\": \"beach\"}").unwrap_err();
        assert!(matches!(err, SoraError::InvalidJobRecord { index: 2, .. }));

        let err = parse_batch("{\"prompt\": \"   \"}").unwrap_err();
        assert!(matches!(err, SoraError::InvalidJobRecord { index: 1, .. }));
    }

    #[test]
    fn non_object_json_is_invalid_record() {
        let err = parse_batch("[\"a\", \"b\"]").unwrap_err();
        assert!(matches!(err, SoraError::InvalidJobRecord { index: 1, .. }));
    }

    #[test]
    fn structured_record_collects_fields_overrides_and_output() {
        let line = r#"{"prompt": " neon city ", "fields": {"scene": "rain", "camera": "pan"}, "camera": "crane up", "model": "sora-2-pro", "seconds": 8, "size": null, "input_reference_path": "ref.png", "out": "city"}"#;
        let jobs = parse_batch(line).unwrap();
        let job = &jobs[0];
        assert_eq!(job.prompt, "neon city");
        assert_eq!(job.fields.get("scene"), Some("rain"));
        assert_eq!(job.fields.get("camera"), Some("crane up"));
        assert_eq!(job.overrides.model.as_deref(), Some("sora-2-pro"));
        assert_eq!(job.overrides.seconds.as_deref(), Some("8"));
        assert_eq!(job.overrides.size, None);
        assert_eq!(job.input_reference, Some(PathBuf::from("ref.png")));
        assert_eq!(job.output_name.as_deref(), Some("city"));
    }

    #[test]
    fn nested_field_values_are_rejected() {
        let err = parse_batch(r#"{"prompt": "x", "fields": {"scene": {"a": 1}}}"#).unwrap_err();
        assert!(matches!(err, SoraError::InvalidJobRecord { .. }));
    }

    #[test]
    fn read_batch_file_missing_path() {
        let err = read_batch_file(Path::new("/definitely/not/here.jsonl")).unwrap_err();
        assert!(err.to_string().contains("Input file not found"));
    }
}
