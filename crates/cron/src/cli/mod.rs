pub mod config;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cronturn: run one scheduled agent turn in its isolated session.
#[derive(Debug, Parser)]
#[command(name = "cronturn", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one cron job turn and print the outcome as JSON.
    Run {
        /// Job definition file (TOML or JSON).
        #[arg(long)]
        job: PathBuf,
        /// Replace the job's message.
        #[arg(long)]
        message: Option<String>,
        /// Run as this agent instead of the job's.
        #[arg(long)]
        agent: Option<String>,
        /// Trigger key or full session key (defaults to "cron:<jobId>").
        #[arg(long)]
        session_key: Option<String>,
        /// Reuse the cached skill snapshot instead of rebuilding it.
        #[arg(long)]
        fast: bool,
        /// Log as JSON lines instead of compact text.
        #[arg(long)]
        log_json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `CT_CONFIG` (or
/// `config.toml` by default).  Returns the parsed config and the path that
/// was used.  A missing file yields the defaults.
pub fn load_config() -> anyhow::Result<(ct_domain::config::Config, String)> {
    let config_path = std::env::var("CT_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        ct_domain::config::Config::default()
    };

    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "cronturn",
            "run",
            "--job",
            "jobs/digest.toml",
            "--session-key",
            "hook:gmail:1",
            "--fast",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                job,
                session_key,
                fast,
                log_json,
                ..
            } => {
                assert_eq!(job, PathBuf::from("jobs/digest.toml"));
                assert_eq!(session_key.as_deref(), Some("hook:gmail:1"));
                assert!(fast);
                assert!(!log_json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn job_is_required() {
        assert!(Cli::try_parse_from(["cronturn", "run"]).is_err());
    }
}
