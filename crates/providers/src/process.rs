//! Process-backed agent runner for CLI providers.
//!
//! Spawns the configured command, writes the prompt to stdin and reads the
//! answer from stdout.  Stdout is either a JSON result object
//! (`{"result": "...", "session_id": "...", "usage": {...}}`) or plain text.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use ct_domain::config::{BackendKind, ModelsConfig, ProviderConfig};
use ct_domain::error::{Error, Result};
use ct_domain::model::ModelRef;
use ct_domain::payload::{AgentMeta, AgentRunResult, Payload, RunMeta, Usage};

use crate::traits::{AgentRunner, PromptContext};

/// Max stderr bytes quoted in error messages.
const STDERR_TAIL: usize = 2_000;

#[derive(Debug, Clone)]
struct CliBackend {
    command: String,
    args: Vec<String>,
    session_arg: Option<String>,
    model_arg: Option<String>,
}

/// Runs CLI providers as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessAgentRunner {
    backends: HashMap<String, CliBackend>,
}

impl ProcessAgentRunner {
    pub fn from_config(models: &ModelsConfig) -> Self {
        let mut runner = Self::default();
        for pc in models.providers.iter().filter(|p| p.kind == BackendKind::Cli) {
            runner.register(pc);
        }
        runner
    }

    pub fn register(&mut self, pc: &ProviderConfig) {
        let Some(command) = pc.command.clone().filter(|c| !c.trim().is_empty()) else {
            tracing::warn!(provider_id = %pc.id, "cli provider has no command, skipping");
            return;
        };
        tracing::info!(provider_id = %pc.id, command = %command, "registered cli provider");
        self.backends.insert(
            pc.id.to_ascii_lowercase(),
            CliBackend {
                command,
                args: pc.args.clone(),
                session_arg: pc.session_arg.clone(),
                model_arg: pc.model_arg.clone(),
            },
        );
    }
}

#[async_trait::async_trait]
impl AgentRunner for ProcessAgentRunner {
    async fn run(
        &self,
        model: &ModelRef,
        ctx: &PromptContext,
        timeout_ms: u64,
    ) -> Result<AgentRunResult> {
        let backend = self
            .backends
            .get(&model.provider.to_ascii_lowercase())
            .ok_or_else(|| Error::Provider {
                provider: model.provider.clone(),
                message: "no cli backend configured".into(),
            })?;

        let mut cmd = Command::new(&backend.command);
        cmd.args(&backend.args);
        if let Some(flag) = &backend.model_arg {
            cmd.arg(flag).arg(&model.model);
        }
        if let (Some(flag), Some(id)) = (&backend.session_arg, &ctx.cli_session_id) {
            cmd.arg(flag).arg(id);
        }
        if ctx.workspace_dir.is_dir() {
            cmd.current_dir(&ctx.workspace_dir);
        }
        cmd.env("CT_SESSION_ID", &ctx.session_id)
            .env("CT_SESSION_KEY", &ctx.session_key)
            .env("CT_RUN_ID", &ctx.run_id)
            .env("CT_MODEL", &model.model);
        if let Some(thinking) = &ctx.thinking {
            cmd.env("CT_THINKING", thinking);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| Error::Provider {
            provider: model.provider.clone(),
            message: format!("failed to spawn {}: {e}", backend.command),
        })?;

        // Feed stdin while stdout/stderr drain, or a CLI that writes before
        // reading would block on a full pipe.
        let stdin = child.stdin.take();
        let input = ctx.combined_input();
        let provider = model.provider.clone();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A CLI that ignores stdin may close it early; that is not fatal.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    tracing::debug!(provider = %provider, error = %e, "stdin write failed");
                }
            }
        };
        let run = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = tokio::time::timeout(Duration::from_millis(timeout_ms), run)
            .await
            .map_err(|_| Error::Timeout(format!("{model} cli run timed out after {timeout_ms}ms")))?
            .map_err(|e| Error::Provider {
                provider: model.provider.clone(),
                message: format!("waiting for cli: {e}"),
            })?;
        let duration_ms = start.elapsed().as_millis() as u64;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = tail_chars(stderr.trim(), STDERR_TAIL);
            return Err(Error::Provider {
                provider: model.provider.clone(),
                message: format!("cli exited with {}: {tail}", output.status),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut result = parse_cli_output(&stdout);
        result.meta.duration_ms = duration_ms;
        result.meta.agent_meta.provider = Some(model.provider.clone());
        result.meta.agent_meta.model = Some(model.model.clone());
        Ok(result)
    }
}

/// Parse CLI stdout into a run result.
fn parse_cli_output(stdout: &str) -> AgentRunResult {
    let trimmed = stdout.trim();
    let parsed = serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(Value::is_object);

    let Some(obj) = parsed else {
        let payloads = if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![Payload::text(trimmed)]
        };
        return AgentRunResult {
            payloads,
            meta: RunMeta::default(),
        };
    };

    let text = ["result", "text", "content"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_owned);
    let is_error = obj.get("is_error").and_then(Value::as_bool).unwrap_or(false);
    let session_id = obj
        .get("session_id")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let usage = obj.get("usage").map(parse_usage).unwrap_or_default();

    let payloads = match text {
        Some(text) => vec![Payload {
            text: Some(text),
            is_error,
            ..Default::default()
        }],
        None => Vec::new(),
    };

    AgentRunResult {
        payloads,
        meta: RunMeta {
            duration_ms: 0,
            agent_meta: AgentMeta {
                session_id,
                provider: None,
                model: None,
                usage,
            },
        },
    }
}

fn parse_usage(v: &Value) -> Usage {
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| v.get(*n).and_then(Value::as_u64))
            .unwrap_or(0)
    };
    Usage {
        input: field(&["input_tokens", "input", "prompt_tokens"]),
        output: field(&["output_tokens", "output", "completion_tokens"]),
        cache_read: field(&["cache_read_input_tokens", "cache_read"]),
        cache_write: field(&["cache_creation_input_tokens", "cache_write"]),
        total: field(&["total_tokens", "total"]),
    }
}

fn tail_chars(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_runner(id: &str, script: &str) -> ProcessAgentRunner {
        let mut runner = ProcessAgentRunner::default();
        runner.register(&ProviderConfig {
            id: id.into(),
            kind: BackendKind::Cli,
            base_url: None,
            api_key_env: None,
            command: Some("sh".into()),
            args: vec!["-c".into(), script.into()],
            session_arg: None,
            model_arg: None,
        });
        runner
    }

    fn ctx(prompt: &str) -> PromptContext {
        PromptContext {
            prompt: prompt.into(),
            workspace_dir: std::env::temp_dir(),
            ..Default::default()
        }
    }

    #[test]
    fn parses_json_result() {
        let r = parse_cli_output(
            r#"{"type":"result","result":"done","session_id":"cli-1","usage":{"input_tokens":10,"output_tokens":20}}"#,
        );
        assert_eq!(r.payloads[0].text.as_deref(), Some("done"));
        assert_eq!(r.meta.agent_meta.session_id.as_deref(), Some("cli-1"));
        assert_eq!(r.meta.agent_meta.usage.input, 10);
        assert_eq!(r.meta.agent_meta.usage.output, 20);
    }

    #[test]
    fn plain_text_is_single_payload() {
        let r = parse_cli_output("  hello world \n");
        assert_eq!(r.payloads.len(), 1);
        assert_eq!(r.payloads[0].text.as_deref(), Some("hello world"));
        assert!(parse_cli_output("").payloads.is_empty());
    }

    #[tokio::test]
    async fn echoes_stdin() {
        let runner = sh_runner("echo-cli", "cat");
        let r = runner
            .run(&ModelRef::new("echo-cli", "m"), &ctx("ping"), 5_000)
            .await
            .unwrap();
        assert_eq!(r.payloads[0].text.as_deref(), Some("ping"));
        assert_eq!(r.meta.agent_meta.provider.as_deref(), Some("echo-cli"));
    }

    #[tokio::test]
    async fn large_prompt_with_chatty_cli_completes() {
        // Writes a megabyte before reading its stdin.
        let runner = sh_runner("chatty", "yes chunk | head -c 1048576; cat >/dev/null");
        let prompt = "p".repeat(1 << 20);
        let r = runner
            .run(&ModelRef::new("chatty", "m"), &ctx(&prompt), 10_000)
            .await
            .unwrap();
        let text = r.payloads[0].text.as_deref().unwrap();
        assert!(text.starts_with("chunk\nchunk"));
        assert!(text.len() > 1_000_000);
    }

    #[tokio::test]
    async fn nonzero_exit_is_provider_error() {
        let runner = sh_runner("bad", "cat >/dev/null; echo boom >&2; exit 3");
        let err = runner
            .run(&ModelRef::new("bad", "m"), &ctx("x"), 5_000)
            .await
            .unwrap_err();
        match err {
            Error::Provider { message, .. } => assert!(message.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let runner = sh_runner("slow", "sleep 5");
        let err = runner
            .run(&ModelRef::new("slow", "m"), &ctx("x"), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn unknown_provider_fails() {
        let err = ProcessAgentRunner::default()
            .run(&ModelRef::new("nope", "m"), &ctx("x"), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }
}
