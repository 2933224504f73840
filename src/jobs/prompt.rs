//! Structured prompt augmentation.
//!
//! Optional fields (scene, camera, lighting, ...) are rendered into labeled
//! lines around the primary request in a fixed order.

use std::collections::BTreeMap;

/// Augmentation keys accepted from the CLI and from batch records.
pub const FIELD_KEYS: [&str; 14] = [
    "use_case",
    "scene",
    "subject",
    "action",
    "camera",
    "style",
    "lighting",
    "palette",
    "audio",
    "dialogue",
    "text",
    "timing",
    "constraints",
    "negative",
];

// Rendering order after "Primary request". `text` and `dialogue` are formatted specially.
const LABELED_AFTER_REQUEST: [(&str, &str); 7] = [
    ("scene", "Scene/background"),
    ("subject", "Subject"),
    ("action", "Action"),
    ("camera", "Camera"),
    ("lighting", "Lighting/mood"),
    ("palette", "Color palette"),
    ("style", "Style/format"),
];

/// Augmentation values keyed by [`FIELD_KEYS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptFields(BTreeMap<String, String>);

impl PromptFields {
    pub fn is_known(key: &str) -> bool {
        FIELD_KEYS.contains(&key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Value for `key` if present and not blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// `self` overlaid with `other`; keys set in `other` win.
    pub fn merged(&self, other: &PromptFields) -> PromptFields {
        let mut out = self.clone();
        for (key, value) in &other.0 {
            out.0.insert(key.clone(), value.clone());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Renders the augmented prompt. With `augment == false` the prompt is returned as-is.
pub fn augment_prompt(augment: bool, prompt: &str, fields: &PromptFields) -> String {
    if !augment {
        return prompt.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    if let Some(use_case) = fields.get("use_case") {
        lines.push(format!("Use case: {use_case}"));
    }
    lines.push(format!("Primary request: {prompt}"));
    for (key, label) in LABELED_AFTER_REQUEST {
        if let Some(value) = fields.get(key) {
            lines.push(format!("{label}: {value}"));
        }
    }
    if let Some(timing) = fields.get("timing") {
        lines.push(format!("Timing/beats: {timing}"));
    }
    if let Some(audio) = fields.get("audio") {
        lines.push(format!("Audio: {audio}"));
    }
    if let Some(text) = fields.get("text") {
        lines.push(format!("Text (verbatim): \"{text}\""));
    }
    if let Some(dialogue) = fields.get("dialogue") {
        lines.push(format!(
            "Dialogue:\n<dialogue>\n{}\n</dialogue>",
            dialogue.trim()
        ));
    }
    if let Some(constraints) = fields.get("constraints") {
        lines.push(format!("Constraints: {constraints}"));
    }
    if let Some(negative) = fields.get("negative") {
        lines.push(format!("Avoid: {negative}"));
    }

    lines.join("\n")
}
