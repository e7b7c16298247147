//! Embedded agent runner for OpenAI-compatible chat completion APIs.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use ct_domain::config::{BackendKind, ModelsConfig, ProviderConfig};
use ct_domain::error::{Error, Result};
use ct_domain::model::ModelRef;
use ct_domain::payload::{AgentMeta, AgentRunResult, Payload, RunMeta, Usage};

use crate::traits::{AgentRunner, PromptContext};
use crate::util::{from_reqwest, resolve_api_key};

#[derive(Debug, Clone)]
struct HttpBackend {
    base_url: String,
    api_key: Option<String>,
}

/// Runs embedded turns against every configured `openai_compat` provider.
#[derive(Debug, Clone)]
pub struct OpenAiCompatRunner {
    backends: HashMap<String, HttpBackend>,
    client: reqwest::Client,
}

impl OpenAiCompatRunner {
    /// Build from `[models]`.  Providers that fail to initialize are logged
    /// and skipped.
    pub fn from_config(models: &ModelsConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(from_reqwest)?;
        let mut backends = HashMap::new();
        for pc in models
            .providers
            .iter()
            .filter(|p| p.kind == BackendKind::OpenaiCompat)
        {
            match HttpBackend::from_config(pc) {
                Ok(backend) => {
                    tracing::info!(provider_id = %pc.id, "registered openai_compat provider");
                    backends.insert(pc.id.to_ascii_lowercase(), backend);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        error = %e,
                        "failed to initialize provider, skipping"
                    );
                }
            }
        }
        Ok(Self { backends, client })
    }

    pub fn provider_count(&self) -> usize {
        self.backends.len()
    }
}

impl HttpBackend {
    fn from_config(pc: &ProviderConfig) -> Result<Self> {
        let base_url = pc
            .base_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Config(format!("provider {} has no base_url", pc.id)))?;
        let api_key = match pc.api_key_env.as_deref() {
            Some(env) => Some(resolve_api_key(env)?),
            None => None,
        };
        Ok(Self {
            base_url: base_url.to_owned(),
            api_key,
        })
    }
}

fn build_chat_body(model: &ModelRef, ctx: &PromptContext) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = ctx.system_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
        messages.push(serde_json::json!({"role": "system", "content": system}));
    }
    messages.push(serde_json::json!({"role": "user", "content": ctx.prompt}));

    let mut body = serde_json::json!({
        "model": model.model,
        "messages": messages,
        "stream": false,
    });
    if let Some(effort) = ctx.thinking.as_deref().filter(|t| *t != "off") {
        body["reasoning_effort"] = serde_json::json!(effort);
    }
    body
}

fn parse_chat_response(provider: &str, body: &Value) -> Result<AgentRunResult> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: provider.into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let usage = body.get("usage").map(parse_openai_usage).unwrap_or_default();
    let model = body.get("model").and_then(|v| v.as_str()).map(String::from);

    let payloads = if content.trim().is_empty() {
        Vec::new()
    } else {
        vec![Payload::text(content)]
    };

    Ok(AgentRunResult {
        payloads,
        meta: RunMeta {
            duration_ms: 0,
            agent_meta: AgentMeta {
                session_id: body.get("id").and_then(|v| v.as_str()).map(String::from),
                provider: Some(provider.to_owned()),
                model,
                usage,
            },
        },
    })
}

fn parse_openai_usage(v: &Value) -> Usage {
    let get = |k: &str| v.get(k).and_then(Value::as_u64).unwrap_or(0);
    Usage {
        input: get("prompt_tokens"),
        output: get("completion_tokens"),
        cache_read: v
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
        cache_write: 0,
        total: get("total_tokens"),
    }
}

#[async_trait::async_trait]
impl AgentRunner for OpenAiCompatRunner {
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
                message: "no embedded backend configured".into(),
            })?;

        let url = format!("{}/chat/completions", backend.base_url);
        let body = build_chat_body(model, ctx);

        tracing::debug!(provider = %model.provider, url = %url, "openai_compat chat request");

        let mut req = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(timeout_ms))
            .json(&body);
        if let Some(key) = &backend.api_key {
            req = req.bearer_auth(key);
        }

        let start = Instant::now();
        let resp = req.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: model.provider.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        let mut result = parse_chat_response(&model.provider, &resp_json)?;
        result.meta.duration_ms = start.elapsed().as_millis() as u64;
        if result.meta.agent_meta.model.is_none() {
            result.meta.agent_meta.model = Some(model.model.clone());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_system_only_when_present() {
        let model = ModelRef::new("openai", "gpt-4o");
        let mut ctx = PromptContext {
            prompt: "hi".into(),
            system_prompt: Some("sys".into()),
            ..Default::default()
        };
        let body = build_chat_body(&model, &ctx);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "system");

        ctx.system_prompt = None;
        ctx.thinking = Some("high".into());
        let body = build_chat_body(&model, &ctx);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["reasoning_effort"], "high");
    }

    #[test]
    fn parses_response() {
        let body = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
        });
        let r = parse_chat_response("openai", &body).unwrap();
        assert_eq!(r.payloads[0].text.as_deref(), Some("hello"));
        assert_eq!(r.meta.agent_meta.usage.total, 30);
        assert_eq!(r.meta.agent_meta.model.as_deref(), Some("gpt-4o-2024-08-06"));
    }

    #[test]
    fn missing_choices_is_provider_error() {
        let err = parse_chat_response("openai", &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[test]
    fn providers_without_base_url_are_skipped() {
        let models = ModelsConfig {
            providers: vec![ProviderConfig {
                id: "broken".into(),
                kind: BackendKind::OpenaiCompat,
                base_url: None,
                api_key_env: None,
                command: None,
                args: vec![],
                session_arg: None,
                model_arg: None,
            }],
            ..Default::default()
        };
        let runner = OpenAiCompatRunner::from_config(&models).unwrap();
        assert_eq!(runner.provider_count(), 0);
    }
}
