//! The `run` subcommand: submit a job and watch it to completion.

use anyhow::{Result, bail};
use console::style;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

use lexsum::client::{DatasetId, JobRequest, PipelineClient};
use lexsum::config::Config;
use lexsum::retry::RetryPolicy;
use lexsum::session::{SessionController, SessionEvent, TerminalEvent};
use lexsum::stage::{StageName, StageStatus};
use lexsum::ui::PipelineUi;

pub async fn run(
    config: &Config,
    file: Option<PathBuf>,
    dataset: Option<DatasetId>,
    entries: u32,
    entry_id: Option<i64>,
) -> Result<()> {
    let request = match (file, dataset) {
        (Some(file), None) => JobRequest::Upload { file },
        (None, Some(dataset)) => JobRequest::Dataset {
            dataset,
            entries,
            entry_id,
        },
        _ => bail!("select a document to upload (--file) or a dataset (--dataset)"),
    };

    let client = PipelineClient::new(&config.api_url);
    let (events_tx, mut events_rx) = mpsc::channel(100);
    let mut controller = SessionController::new(client, RetryPolicy::default(), events_tx);

    let session_id = controller.start(request).await?;

    let ui = PipelineUi::new();
    ui.println(format!(
        "{} session {}",
        style("▶").green().bold(),
        style(&session_id).yellow()
    ));

    let mut last_status: BTreeMap<StageName, StageStatus> = BTreeMap::new();
    while let Some(event) = events_rx.recv().await {
        match event {
            SessionEvent::Stage {
                stage,
                percent,
                status,
            } => {
                if config.verbose && last_status.insert(stage, status) != Some(status) {
                    let label = match status {
                        StageStatus::Pending => "pending",
                        StageStatus::InProgress => "in progress",
                        StageStatus::Completed => "complete",
                    };
                    ui.println(format!("    {} {} {}", style("→").dim(), stage, style(label).dim()));
                }
                ui.update(stage, percent, status);
            }
            SessionEvent::Terminal(terminal) => {
                ui.finish();
                return report(terminal);
            }
        }
    }

    bail!("session ended without a terminal event")
}

fn report(terminal: TerminalEvent) -> Result<()> {
    if let Some(message) = terminal.error {
        bail!(message);
    }

    println!();
    println!("{}", style("Summaries").bold().underlined());
    for (idx, summary) in terminal.summaries.iter().enumerate() {
        println!("\n{} {}", style(format!("[{}]", idx + 1)).dim(), summary);
    }

    if !terminal.records.is_empty() {
        println!("\n{}", style("Documents").bold().underlined());
        for record in &terminal.records {
            println!("\n{} {}", style("entry").dim(), style(record.key).cyan());
            println!(
                "  {} {}",
                style("reference:").dim(),
                record.reference_summary
            );
            println!(
                "  {} {}",
                style("generated:").dim(),
                record.generated_summary
            );
        }
    }

    if !terminal.scores.is_empty() {
        println!("\n{}", style("Average ROUGE").bold().underlined());
        for (name, value) in &terminal.scores {
            println!("  {:>8}: {:.2}%", name, value * 100.0);
        }
    }

    Ok(())
}
