//! Interface de terminal: barra de progresso do lote, spinner de polling e
//! saída JSON.
//!
//! Usa `indicatif` para progresso e `console` para cores. Tudo que é
//! decorativo vai para stderr; stdout recebe apenas documentos JSON, para que
//! a saída possa ser redirecionada para outras ferramentas.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::openai::JobStatus;
use crate::orchestrator::{BatchResult, SubmissionOutcome};

/// Progresso de um lote: uma barra com contagem de jobs concluídos e uma
/// linha colorida por job finalizado.
///
/// Clonável; todos os clones desenham na mesma barra.
#[derive(Clone)]
pub struct BatchProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl BatchProgress {
    /// Inicia a barra para `total` jobs.
    pub fn start(total: u64) -> Self {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} jobs {msg}")
                .expect("invalid template")
                .progress_chars("=> "),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Self::with_bar(pb)
    }

    /// Versão silenciosa, sem nada desenhado no terminal.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(pb: ProgressBar) -> Self {
        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Registra o fim de um job e avança a barra.
    pub fn job_done(&self, label: &str, outcome: &SubmissionOutcome) {
        let line = match &outcome.result {
            Ok(record) => format!(
                "  {} {label} {}",
                self.green.apply_to("✓"),
                record.id().unwrap_or("(no id)")
            ),
            Err(info) if info.is_canceled() => {
                format!("  {} {label} skipped", self.yellow.apply_to("-"))
            }
            Err(info) => format!(
                "  {} {label} {}: {}",
                self.red.apply_to("✗"),
                info.kind,
                info.message
            ),
        };
        self.pb.println(line);
        self.pb.inc(1);
    }

    /// Finaliza a barra e imprime o resumo do lote.
    pub fn finish(&self, result: &BatchResult) {
        self.pb.finish_and_clear();
        if self.pb.is_hidden() {
            return;
        }
        let succeeded = result.succeeded();
        let failed = result.failed();
        let style = if failed == 0 { &self.green } else { &self.red };
        eprintln!(
            "{}",
            style.apply_to(format!("{succeeded} succeeded, {failed} failed"))
        );
        if let Some(index) = result.aborted_by {
            eprintln!(
                "{}",
                self.yellow
                    .apply_to(format!("Stopped after job {index} failed (--fail-fast)"))
            );
        }
    }
}

/// Spinner exibido enquanto um job é acompanhado por polling.
pub struct PollSpinner {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl PollSpinner {
    pub fn start(id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .expect("invalid template"),
        );
        pb.set_message(format!("{id}: waiting"));
        pb.enable_steady_tick(Duration::from_millis(100));
        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Atualiza a mensagem quando o status muda.
    pub fn status(&self, id: &str, status: JobStatus) {
        self.pb.set_message(format!("{id}: {status}"));
    }

    pub fn finish(&self, id: &str, status: JobStatus) {
        self.pb.finish_and_clear();
        let mark = match status {
            JobStatus::Completed => self.green.apply_to("✓"),
            _ => self.red.apply_to("✗"),
        };
        eprintln!("  {mark} {id} {status}");
    }

    pub fn abandon(&self) {
        self.pb.finish_and_clear();
    }
}

/// Imprime um documento JSON formatado em stdout.
pub fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}
