use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ct_cron::cli::run::RunArgs;
use ct_cron::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            job,
            message,
            agent,
            session_key,
            fast,
            log_json,
        } => {
            init_tracing(log_json);
            let (config, _) = ct_cron::cli::load_config()?;
            let args = RunArgs {
                message,
                agent,
                session_key,
                fast,
            };
            ct_cron::cli::run::run(Arc::new(config), &job, args).await
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = ct_cron::cli::load_config()?;
            if !ct_cron::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _config_path) = ct_cron::cli::load_config()?;
            ct_cron::cli::config::show(&config)
        }
        Command::Version => {
            println!("cronturn {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Stderr-only tracing so stdout carries nothing but the outcome.
///
/// Defaults to `info` for the cronturn crates and `warn` elsewhere;
/// `RUST_LOG` overrides.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,ct_cron=info,ct_domain=info,ct_sessions=info,ct_providers=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
