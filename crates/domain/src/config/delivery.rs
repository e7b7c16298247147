use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound channels
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One optional section per channel.  A channel without a section cannot
/// be delivered to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub discord: Option<ChannelConfig>,
    #[serde(default)]
    pub slack: Option<ChannelConfig>,
    #[serde(default)]
    pub telegram: Option<ChannelConfig>,
    #[serde(default)]
    pub whatsapp: Option<ChannelConfig>,
    #[serde(default)]
    pub signal: Option<ChannelConfig>,
    #[serde(default)]
    pub imessage: Option<ChannelConfig>,
    #[serde(default)]
    pub webhook: Option<ChannelConfig>,
}

impl ChannelsConfig {
    pub fn get(&self, kind: ChannelKind) -> Option<&ChannelConfig> {
        match kind {
            ChannelKind::Discord => self.discord.as_ref(),
            ChannelKind::Slack => self.slack.as_ref(),
            ChannelKind::Telegram => self.telegram.as_ref(),
            ChannelKind::WhatsApp => self.whatsapp.as_ref(),
            ChannelKind::Signal => self.signal.as_ref(),
            ChannelKind::IMessage => self.imessage.as_ref(),
            ChannelKind::Webhook => self.webhook.as_ref(),
        }
    }

    /// Configured channels, in declaration order.
    pub fn configured(&self) -> impl Iterator<Item = (ChannelKind, &ChannelConfig)> {
        ChannelKind::ALL
            .into_iter()
            .filter_map(|k| self.get(k).map(|c| (k, c)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Bridge endpoint that receives delivery POSTs for this channel.
    pub webhook_url: String,
    /// Env var holding a bearer token for the bridge.
    #[serde(default)]
    pub token_env: Option<String>,
    /// Recipient used when a job names the channel but no `to`.
    #[serde(default)]
    pub default_to: Option<String>,
    #[serde(default)]
    pub default_account: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hooks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HooksConfig {
    #[serde(default)]
    pub gmail: GmailHookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GmailHookConfig {
    /// Model for turns triggered by the Gmail hook.  Used only when allowed.
    #[serde(default)]
    pub model: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Security
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Scan the agent's output for injection patterns before delivery
    /// (external hook sessions only).
    #[serde(default = "d_true")]
    pub scan_output: bool,
    #[serde(default)]
    pub on_suspicious_output: SuspiciousPolicy,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            scan_output: true,
            on_suspicious_output: SuspiciousPolicy::Allow,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspiciousPolicy {
    /// Log and deliver anyway.
    #[default]
    Allow,
    /// Log and skip delivery.
    Block,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
