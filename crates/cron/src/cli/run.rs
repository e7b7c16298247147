//! `cronturn run`: execute one cron job turn and print its outcome.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use ct_domain::config::Config;
use ct_domain::job::CronJob;

use crate::bootstrap;
use crate::isolated::{DeliveryOutcome, IsolatedTurnRunner, TurnOptions, TurnOutcome, TurnRequest};

/// Options of the `run` subcommand beyond the job file.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub message: Option<String>,
    pub agent: Option<String>,
    pub session_key: Option<String>,
    pub fast: bool,
}

/// Load a job from TOML, or JSON when the file ends in `.json`.
pub fn load_job(path: &Path) -> anyhow::Result<CronJob> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading job file {}", path.display()))?;
    let job: CronJob = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    };
    if job.id.trim().is_empty() {
        anyhow::bail!("job in {} has an empty id", path.display());
    }
    Ok(job)
}

/// Whether the outcome should make the process exit non-zero.
pub fn outcome_failed(outcome: &TurnOutcome) -> bool {
    matches!(
        outcome.delivery,
        DeliveryOutcome::Failed {
            best_effort: false,
            ..
        }
    )
}

pub async fn run(config: Arc<Config>, job_path: &Path, args: RunArgs) -> anyhow::Result<()> {
    let job = load_job(job_path)?;
    let deps = bootstrap::build_turn_deps(config)?;
    let runner = IsolatedTurnRunner::new(deps, TurnOptions { fast: args.fast });

    let request = TurnRequest {
        job,
        message: args.message,
        agent_id: args.agent,
        session_key: args.session_key,
    };

    match runner.run_turn(request).await {
        Ok(outcome) => {
            let json = serde_json::to_string_pretty(&outcome).context("serializing outcome")?;
            println!("{json}");
            if outcome_failed(&outcome) {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            let json = serde_json::json!({ "status": "error", "error": e.to_string() });
            println!("{json}");
            std::process::exit(1);
        }
    }
}
