//! Handlers de cada subcomando.
//!
//! Cada handler resolve configuração + flags em valores imutáveis
//! ([`BatchDefaults`], [`BatchOptions`], [`PollOptions`]), fala com a API
//! através de [`VideoApi`] e devolve o código de saída do processo.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::cli::{
    AugmentArgs, BatchArgs, Command, CreateArgs, DownloadArgs, DownloadTarget, JsonOutArg,
    OrderArg, PollArgs, PromptArgs,
};
use crate::config::SoraConfig;
use crate::error::SoraError;
use crate::jobs::{BatchDefaults, JobSpec, augment_prompt, build, read_batch_file};
use crate::openai::{
    CreateVideoRequest, JobStatus, ListParams, OpenAiVideoClient, VideoApi, VideoRecord,
};
use crate::orchestrator::{
    BatchOptions, BatchOrchestrator, BatchRun, CancelSignal, dry_run_batch, submit,
};
use crate::output::{ResultWriter, normalize_json_out, normalize_out_path, write_download, write_json};
use crate::poller::{PollOptions, poll};
use crate::retry::RetryPolicy;
use crate::ui::{PollSpinner, print_json};

const CREATE_ENDPOINT: &str = "/v1/videos";

/// Executa o subcomando e devolve o código de saída (0 = sucesso).
pub async fn run(command: Command, config: &SoraConfig) -> Result<u8> {
    match command {
        Command::Create {
            prompt_args,
            create,
            json_out,
        } => {
            let api = connect(config, create.dry_run)?;
            cmd_create(api.as_ref(), config, &prompt_args, &create, &json_out).await
        }
        Command::CreateAndPoll {
            prompt_args,
            create,
            poll,
            download,
            json_out,
        } => {
            let api = connect(config, create.dry_run)?;
            cmd_create_and_poll(api.as_ref(), config, &prompt_args, &create, &poll, &download, &json_out)
                .await
        }
        Command::Poll {
            id,
            poll,
            download,
            json_out,
        } => {
            let api = client(config)?;
            cmd_poll(&api, config, &id, &poll, &download, &json_out).await
        }
        Command::Status { id, json_out } => {
            let api = client(config)?;
            let record = api.retrieve(&id).await?;
            print_json(record.raw());
            save_json(&json_out, "status.json", record.raw()).await?;
            Ok(0)
        }
        Command::List {
            limit,
            order,
            after,
            before,
            json_out,
        } => {
            let api = client(config)?;
            let params = ListParams {
                limit,
                order: order.map(OrderArg::into),
                after,
                before,
            };
            let listing = api.list(&params).await?;
            print_json(&listing);
            save_json(&json_out, "list.json", &listing).await?;
            Ok(0)
        }
        Command::Delete { id, json_out } => {
            let api = client(config)?;
            let deleted = api.delete(&id).await?;
            print_json(&deleted);
            save_json(&json_out, "delete.json", &deleted).await?;
            Ok(0)
        }
        Command::Remix {
            id,
            prompt_args,
            dry_run,
            json_out,
        } => {
            let api = connect(config, dry_run)?;
            cmd_remix(api.as_ref(), &id, &prompt_args, dry_run, &json_out).await
        }
        Command::Download { id, target } => {
            let api = client(config)?;
            let out_path = normalize_out_path(target.out.as_deref(), target.variant);
            write_download(&api, &id, target.variant, &out_path, target.force).await?;
            Ok(0)
        }
        Command::CreateBatch(args) => {
            let api = connect(config, args.create.dry_run)?.map(Arc::new);
            cmd_create_batch(api, config, &args).await
        }
    }
}

fn client(config: &SoraConfig) -> Result<OpenAiVideoClient, SoraError> {
    if config.api_key.is_empty() {
        return Err(SoraError::MissingApiKey);
    }
    let client = match &config.base_url {
        Some(url) => OpenAiVideoClient::with_base_url(config.api_key.clone(), url.clone())?,
        None => OpenAiVideoClient::new(config.api_key.clone())?,
    };
    Ok(client)
}

/// Like [`client`], but a missing key only warns in dry-run mode and yields `None`.
fn connect(config: &SoraConfig, dry_run: bool) -> Result<Option<OpenAiVideoClient>, SoraError> {
    if dry_run && config.api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set; dry-run only.");
        return Ok(None);
    }
    client(config).map(Some)
}

fn batch_defaults(config: &SoraConfig, create: &CreateArgs, augment: &AugmentArgs) -> BatchDefaults {
    BatchDefaults {
        model: create.model.clone().unwrap_or_else(|| config.model.clone()),
        size: create.size.clone().unwrap_or_else(|| config.size.clone()),
        seconds: create
            .seconds
            .clone()
            .unwrap_or_else(|| config.seconds.to_string()),
        fields: augment.fields(),
        augment: augment.enabled(),
    }
}

fn poll_options(config: &SoraConfig, args: &PollArgs) -> Result<PollOptions, SoraError> {
    PollOptions::from_secs(
        args.poll_interval.unwrap_or(config.poll_interval_secs),
        args.timeout,
    )
}

/// Single-job request built through the same path as batch jobs.
fn single_request(
    config: &SoraConfig,
    prompt_args: &PromptArgs,
    create: &CreateArgs,
) -> Result<CreateVideoRequest, SoraError> {
    let prompt = prompt_args.read_prompt()?;
    let mut job = JobSpec::from_prompt(&prompt, 1)?;
    job.input_reference = create.input_reference.clone();
    build(&job, &batch_defaults(config, create, &prompt_args.augment))
}

fn create_preview(request: &CreateVideoRequest) -> Value {
    let mut preview = json!({ "endpoint": CREATE_ENDPOINT });
    if let (Some(map), Value::Object(body)) = (preview.as_object_mut(), request.preview()) {
        map.extend(body);
    }
    preview
}

async fn save_json(json_out: &JsonOutArg, default_name: &str, value: &Value) -> Result<()> {
    if let Some(path) = normalize_json_out(json_out.json_out.as_deref(), default_name) {
        write_json(&path, value)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

async fn create_one<C: VideoApi>(
    api: &C,
    config: &SoraConfig,
    request: &CreateVideoRequest,
) -> Result<VideoRecord, SoraError> {
    let policy = RetryPolicy::new(config.max_attempts);
    let record = submit(api, request, &policy, &CancelSignal::new(), "[create]").await?;
    Ok(record)
}

async fn poll_job<C: VideoApi>(
    api: &C,
    id: &str,
    options: &PollOptions,
) -> Result<VideoRecord, SoraError> {
    let spinner = PollSpinner::start(id);
    match poll(api, id, options, |status| spinner.status(id, status)).await {
        Ok(record) => {
            spinner.finish(id, record.status());
            Ok(record)
        }
        Err(err) => {
            spinner.abandon();
            Err(err)
        }
    }
}

async fn download_completed<C: VideoApi>(
    api: &C,
    id: &str,
    record: &VideoRecord,
    target: &DownloadTarget,
) -> Result<(), SoraError> {
    let status = record.status();
    if status != JobStatus::Completed {
        return Err(SoraError::DownloadState {
            id: id.to_string(),
            status,
        });
    }
    let out_path = normalize_out_path(target.out.as_deref(), target.variant);
    write_download(api, id, target.variant, &out_path, target.force).await?;
    Ok(())
}

async fn cmd_create<C: VideoApi>(
    api: Option<&C>,
    config: &SoraConfig,
    prompt_args: &PromptArgs,
    create: &CreateArgs,
    json_out: &JsonOutArg,
) -> Result<u8> {
    let request = single_request(config, prompt_args, create)?;

    let Some(api) = api.filter(|_| !create.dry_run) else {
        let preview = create_preview(&request);
        print_json(&preview);
        save_json(json_out, "create.json", &json!({"dry_run": true, "request": preview})).await?;
        return Ok(0);
    };

    let record = create_one(api, config, &request).await?;
    print_json(record.raw());
    save_json(json_out, "create.json", record.raw()).await?;
    Ok(0)
}

async fn cmd_create_and_poll<C: VideoApi>(
    api: Option<&C>,
    config: &SoraConfig,
    prompt_args: &PromptArgs,
    create: &CreateArgs,
    poll_args: &PollArgs,
    download: &DownloadArgs,
    json_out: &JsonOutArg,
) -> Result<u8> {
    let request = single_request(config, prompt_args, create)?;
    let options = poll_options(config, poll_args)?;

    let Some(api) = api.filter(|_| !create.dry_run) else {
        let preview = create_preview(&request);
        print_json(&preview);
        eprintln!("Would poll for completion.");
        let mut bundle = json!({"dry_run": true, "request": preview, "poll": true});
        if download.download {
            let target = &download.target;
            let out_path = normalize_out_path(target.out.as_deref(), target.variant);
            eprintln!(
                "Would download variant={} to {}",
                target.variant.as_str(),
                out_path.display()
            );
            bundle["download"] = json!({
                "variant": target.variant.as_str(),
                "out": out_path.display().to_string(),
            });
        }
        save_json(json_out, "create-and-poll.json", &bundle).await?;
        return Ok(0);
    };

    let created = create_one(api, config, &request).await?;
    print_json(created.raw());
    let id = created.id().ok_or(SoraError::MissingJobId)?.to_string();
    info!(%id, "created");

    let final_record = poll_job(api, &id, &options).await?;
    print_json(final_record.raw());

    if download.download {
        download_completed(api, &id, &final_record, &download.target).await?;
    }
    save_json(
        json_out,
        "create-and-poll.json",
        &json!({"create": created.raw(), "final": final_record.raw()}),
    )
    .await?;
    Ok(0)
}

async fn cmd_poll<C: VideoApi>(
    api: &C,
    config: &SoraConfig,
    id: &str,
    poll_args: &PollArgs,
    download: &DownloadArgs,
    json_out: &JsonOutArg,
) -> Result<u8> {
    let options = poll_options(config, poll_args)?;
    let record = poll_job(api, id, &options).await?;
    print_json(record.raw());
    save_json(json_out, "poll.json", record.raw()).await?;
    if download.download {
        download_completed(api, id, &record, &download.target).await?;
    }
    Ok(0)
}

async fn cmd_remix<C: VideoApi>(
    api: Option<&C>,
    id: &str,
    prompt_args: &PromptArgs,
    dry_run: bool,
    json_out: &JsonOutArg,
) -> Result<u8> {
    let prompt = prompt_args.read_prompt()?;
    let prompt = augment_prompt(
        prompt_args.augment.enabled(),
        &prompt,
        &prompt_args.augment.fields(),
    );

    let Some(api) = api.filter(|_| !dry_run) else {
        let preview = json!({"endpoint": format!("{CREATE_ENDPOINT}/{id}/remix"), "prompt": prompt});
        print_json(&preview);
        save_json(json_out, "remix.json", &json!({"dry_run": true, "request": preview})).await?;
        return Ok(0);
    };

    let record = api.remix(id, &prompt).await?;
    print_json(record.raw());
    save_json(json_out, "remix.json", record.raw()).await?;
    Ok(0)
}

async fn cmd_create_batch<C: VideoApi + 'static>(
    api: Option<Arc<C>>,
    config: &SoraConfig,
    args: &BatchArgs,
) -> Result<u8> {
    let jobs = read_batch_file(&args.input)?;
    let defaults = batch_defaults(config, &args.create, &args.augment);
    let options = BatchOptions::new(
        args.concurrency.unwrap_or(config.concurrency),
        args.max_attempts.unwrap_or(config.max_attempts),
    )
    .fail_fast(args.fail_fast)
    .dry_run(args.create.dry_run);
    let writer = ResultWriter::new(&args.out_dir);

    // connect() yields no client only in dry-run mode.
    let Some(api) = api else {
        return report(dry_run_batch(&jobs, &defaults, &writer)?, &args.out_dir);
    };
    let orchestrator = BatchOrchestrator::new(api, writer, options);
    report(orchestrator.run_batch(&jobs, &defaults).await?, &args.out_dir)
}

fn report(run: BatchRun, out_dir: &Path) -> Result<u8> {
    match &run {
        BatchRun::Preview(previews) => {
            for preview in previews {
                print_json(preview);
            }
        }
        BatchRun::Submitted(result) => {
            info!(
                succeeded = result.succeeded(),
                failed = result.failed(),
                out_dir = %out_dir.display(),
                "batch finished"
            );
        }
    }
    Ok(run.exit_code())
}
