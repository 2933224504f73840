//! Interface de linha de comando baseada em clap.
//!
//! Define a struct [`Cli`] com os subcomandos de [`Command`] e a flag global
//! `--verbose`. Grupos de argumentos compartilhados (prompt, criação,
//! polling, download) são structs achatadas com `#[command(flatten)]`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::SoraError;
use crate::jobs::PromptFields;
use crate::openai::{ListOrder, Variant};

/// Cria e gerencia vídeos pela Sora Video API.
#[derive(Debug, Parser)]
#[command(name = "sora", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new video job.
    Create {
        #[command(flatten)]
        prompt_args: PromptArgs,
        #[command(flatten)]
        create: CreateArgs,
        #[command(flatten)]
        json_out: JsonOutArg,
    },

    /// Create a job, poll until it finishes, optionally download.
    CreateAndPoll {
        #[command(flatten)]
        prompt_args: PromptArgs,
        #[command(flatten)]
        create: CreateArgs,
        #[command(flatten)]
        poll: PollArgs,
        #[command(flatten)]
        download: DownloadArgs,
        #[command(flatten)]
        json_out: JsonOutArg,
    },

    /// Poll an existing job until it finishes.
    Poll {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        poll: PollArgs,
        #[command(flatten)]
        download: DownloadArgs,
        #[command(flatten)]
        json_out: JsonOutArg,
    },

    /// Retrieve a job's current record.
    Status {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        json_out: JsonOutArg,
    },

    /// List recent video jobs.
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, value_enum)]
        order: Option<OrderArg>,
        #[arg(long)]
        after: Option<String>,
        #[arg(long)]
        before: Option<String>,
        #[command(flatten)]
        json_out: JsonOutArg,
    },

    /// Delete a video job.
    Delete {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        json_out: JsonOutArg,
    },

    /// Remix a completed video job with a new prompt.
    Remix {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        prompt_args: PromptArgs,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[command(flatten)]
        json_out: JsonOutArg,
    },

    /// Download video, thumbnail or spritesheet.
    Download {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        target: DownloadTarget,
    },

    /// Create many jobs from a file with one job per line.
    CreateBatch(BatchArgs),
}

/// Prompt de entrada: `--prompt` ou `--prompt-file`, mais os campos de aumento.
#[derive(Debug, Clone, Default, Args)]
pub struct PromptArgs {
    #[arg(long, conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Arquivo cujo conteúdo (sem espaços nas pontas) é o prompt.
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    #[command(flatten)]
    pub augment: AugmentArgs,
}

impl PromptArgs {
    /// Lê o prompt de exatamente uma das duas fontes.
    pub fn read_prompt(&self) -> Result<String, SoraError> {
        let prompt = match (&self.prompt, &self.prompt_file) {
            (Some(_), Some(_)) => {
                return Err(SoraError::InvalidOption(
                    "Use --prompt or --prompt-file, not both.".into(),
                ));
            }
            (Some(prompt), None) => prompt.trim().to_string(),
            (None, Some(path)) => {
                if !path.exists() {
                    return Err(SoraError::InvalidOption(format!(
                        "Prompt file not found: {}",
                        path.display()
                    )));
                }
                std::fs::read_to_string(path)?.trim().to_string()
            }
            (None, None) => {
                return Err(SoraError::InvalidOption(
                    "Missing prompt. Use --prompt or --prompt-file.".into(),
                ));
            }
        };
        if prompt.is_empty() {
            return Err(SoraError::InvalidOption("Prompt is empty.".into()));
        }
        Ok(prompt)
    }
}

/// Controle de aumento do prompt e os 14 campos estruturados.
#[derive(Debug, Clone, Default, Args)]
pub struct AugmentArgs {
    /// Render structured fields around the prompt (default).
    #[arg(long, default_value_t = false, overrides_with = "no_augment")]
    pub augment: bool,

    /// Send the prompt verbatim.
    #[arg(long, default_value_t = false, overrides_with = "augment")]
    pub no_augment: bool,

    #[arg(long)]
    pub use_case: Option<String>,
    #[arg(long)]
    pub scene: Option<String>,
    #[arg(long)]
    pub subject: Option<String>,
    #[arg(long)]
    pub action: Option<String>,
    #[arg(long)]
    pub camera: Option<String>,
    #[arg(long)]
    pub style: Option<String>,
    #[arg(long)]
    pub lighting: Option<String>,
    #[arg(long)]
    pub palette: Option<String>,
    #[arg(long)]
    pub audio: Option<String>,
    #[arg(long)]
    pub dialogue: Option<String>,
    #[arg(long)]
    pub text: Option<String>,
    #[arg(long)]
    pub timing: Option<String>,
    #[arg(long)]
    pub constraints: Option<String>,
    /// Things to avoid; rendered as "Avoid".
    #[arg(long)]
    pub negative: Option<String>,
}

impl AugmentArgs {
    pub fn enabled(&self) -> bool {
        !self.no_augment
    }

    pub fn fields(&self) -> PromptFields {
        let pairs = [
            ("use_case", &self.use_case),
            ("scene", &self.scene),
            ("subject", &self.subject),
            ("action", &self.action),
            ("camera", &self.camera),
            ("style", &self.style),
            ("lighting", &self.lighting),
            ("palette", &self.palette),
            ("audio", &self.audio),
            ("dialogue", &self.dialogue),
            ("text", &self.text),
            ("timing", &self.timing),
            ("constraints", &self.constraints),
            ("negative", &self.negative),
        ];
        let mut fields = PromptFields::default();
        for (key, value) in pairs {
            if let Some(value) = value {
                fields.set(key, value.clone());
            }
        }
        fields
    }
}

/// Parâmetros de criação. Valores ausentes vêm de `sora.toml`.
#[derive(Debug, Clone, Default, Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub size: Option<String>,
    #[arg(long)]
    pub seconds: Option<String>,
    /// Image (jpeg, png, webp) used as the first frame.
    #[arg(long)]
    pub input_reference: Option<PathBuf>,
    /// Print the request instead of sending it.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct PollArgs {
    /// Seconds between status checks.
    #[arg(long)]
    pub poll_interval: Option<f64>,
    /// Give up after this many seconds.
    #[arg(long)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Args)]
pub struct DownloadArgs {
    /// Download the chosen variant once the job completes.
    #[arg(long, default_value_t = false)]
    pub download: bool,
    #[command(flatten)]
    pub target: DownloadTarget,
}

#[derive(Debug, Clone, Args)]
pub struct DownloadTarget {
    #[arg(long, default_value = "video", value_parser = parse_variant)]
    pub variant: Variant,
    /// Destination file; the variant's extension is added when missing.
    #[arg(long)]
    pub out: Option<String>,
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct JsonOutArg {
    /// Also save the JSON result here (a directory gets a default file name).
    #[arg(long)]
    pub json_out: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct BatchArgs {
    /// Input file, one job per line (bare prompt or JSON object).
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub out_dir: PathBuf,
    /// Maximum simultaneous create calls (1-10).
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Tries per job including the first (1-10).
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Stop scheduling jobs after the first failure.
    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,
    #[command(flatten)]
    pub create: CreateArgs,
    #[command(flatten)]
    pub augment: AugmentArgs,
}

/// Ordem de listagem aceita pela CLI, mapeada para [`ListOrder`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for ListOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Asc => ListOrder::Asc,
            OrderArg::Desc => ListOrder::Desc,
        }
    }
}

fn parse_variant(raw: &str) -> Result<Variant, String> {
    Variant::parse(raw).ok_or_else(|| {
        let allowed: Vec<&str> = Variant::ALL.iter().map(|v| v.as_str()).collect();
        format!("variant must be one of: {}", allowed.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_create_subcommand() {
        let cli = Cli::parse_from([
            "sora", "create", "--prompt", "a cat", "--model", "sora-2-pro", "--camera", "dolly in",
            "--dry-run",
        ]);
        match cli.command {
            Command::Create {
                prompt_args,
                create,
                json_out,
            } => {
                assert_eq!(prompt_args.read_prompt().unwrap(), "a cat");
                assert!(prompt_args.augment.enabled());
                assert_eq!(prompt_args.augment.fields().get("camera"), Some("dolly in"));
                assert_eq!(create.model.as_deref(), Some("sora-2-pro"));
                assert!(create.dry_run);
                assert!(json_out.json_out.is_none());
            }
            _ => panic!("expected Create command"),
        }
    }

    #[test]
    fn last_augment_flag_wins() {
        let cli = Cli::parse_from(["sora", "remix", "--id", "v1", "--prompt", "x", "--augment", "--no-augment"]);
        let Command::Remix { prompt_args, .. } = cli.command else { panic!("expected Remix") };
        assert!(!prompt_args.augment.enabled());

        let cli = Cli::parse_from(["sora", "remix", "--id", "v1", "--prompt", "x", "--no-augment", "--augment"]);
        let Command::Remix { prompt_args, .. } = cli.command else { panic!("expected Remix") };
        assert!(prompt_args.augment.enabled());
    }

    #[test]
    fn prompt_and_prompt_file_conflict() {
        let parsed = Cli::try_parse_from([
            "sora", "create", "--prompt", "a", "--prompt-file", "p.txt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn prompt_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "\n  neon harbor at night \n").unwrap();
        let args = PromptArgs {
            prompt_file: Some(path),
            ..Default::default()
        };
        assert_eq!(args.read_prompt().unwrap(), "neon harbor at night");
        assert!(PromptArgs::default().read_prompt().is_err());
    }

    #[test]
    fn cli_parses_batch_and_global_verbose() {
        let cli = Cli::parse_from([
            "sora", "--verbose", "create-batch", "--input", "jobs.jsonl", "--out-dir", "out",
            "--concurrency", "5", "--fail-fast", "--seconds", "8", "--style", "anime",
        ]);
        assert!(cli.verbose);
        let Command::CreateBatch(args) = cli.command else { panic!("expected CreateBatch") };
        assert_eq!(args.input, PathBuf::from("jobs.jsonl"));
        assert_eq!(args.concurrency, Some(5));
        assert_eq!(args.max_attempts, None);
        assert!(args.fail_fast);
        assert_eq!(args.create.seconds.as_deref(), Some("8"));
        assert_eq!(args.augment.fields().get("style"), Some("anime"));
    }

    #[test]
    fn download_variant_is_validated() {
        let cli = Cli::parse_from(["sora", "download", "--id", "v", "--variant", "Thumbnail"]);
        let Command::Download { target, .. } = cli.command else { panic!("expected Download") };
        assert_eq!(target.variant, Variant::Thumbnail);
        assert!(!target.force);

        assert!(Cli::try_parse_from(["sora", "download", "--id", "v", "--variant", "gif"]).is_err());
    }

    #[test]
    fn list_order_maps_to_api_order() {
        let cli = Cli::parse_from(["sora", "list", "--limit", "5", "--order", "asc"]);
        let Command::List { limit, order, .. } = cli.command else { panic!("expected List") };
        assert_eq!(limit, Some(5));
        assert_eq!(order.map(ListOrder::from), Some(ListOrder::Asc));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
