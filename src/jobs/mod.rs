pub mod payload;
pub mod prompt;
pub mod source;

pub use payload::{BatchDefaults, build, build_all};
pub use prompt::{FIELD_KEYS, PromptFields, augment_prompt};
pub use source::{JobSpec, MAX_BATCH_JOBS, PayloadOverrides, parse_batch, read_batch_file};
