//! The `status` subcommand: one poll of an existing session, printed and done.

use anyhow::{Result, bail};
use console::style;

use lexsum::client::{PipelineClient, PollResult};
use lexsum::config::Config;
use lexsum::stage::StageName;

pub async fn run(config: &Config, session_id: &str) -> Result<()> {
    let client = PipelineClient::new(&config.api_url);

    match client.poll(session_id).await? {
        PollResult::NotYetVisible => {
            println!(
                "session {} is not yet visible to the service",
                style(session_id).yellow()
            );
        }
        PollResult::InProgress { completed, running } => {
            println!("{}", style("in progress").yellow());
            for stage in StageName::ALL {
                let marker = if completed.contains(&stage) {
                    style("done").green()
                } else if running.contains(&stage) {
                    style("running").yellow()
                } else {
                    style("pending").dim()
                };
                println!("  {:>20} {}", stage.wire_name(), marker);
            }
        }
        PollResult::Completed { summaries } => {
            println!(
                "{} ({} summaries)",
                style("completed").green(),
                summaries.len()
            );
        }
        PollResult::Failed(message) => bail!("pipeline error: {message}"),
    }

    Ok(())
}
