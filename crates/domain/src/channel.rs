use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Outbound channels a cron turn can deliver to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Discord,
    Slack,
    Telegram,
    WhatsApp,
    Signal,
    IMessage,
    Webhook,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 7] = [
        Self::Discord,
        Self::Slack,
        Self::Telegram,
        Self::WhatsApp,
        Self::Signal,
        Self::IMessage,
        Self::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Slack => "slack",
            Self::Telegram => "telegram",
            Self::WhatsApp => "whatsapp",
            Self::Signal => "signal",
            Self::IMessage => "imessage",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("unknown channel: {s}"))
    }
}

/// Delivery channel as written in a job: a concrete channel, or `"last"`
/// meaning wherever the agent's main session last talked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChannelSelector {
    #[default]
    Last,
    Channel(ChannelKind),
}

impl TryFrom<String> for ChannelSelector {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().eq_ignore_ascii_case("last") {
            return Ok(Self::Last);
        }
        value.parse().map(Self::Channel)
    }
}

impl From<ChannelSelector> for String {
    fn from(value: ChannelSelector) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Last => f.write_str("last"),
            Self::Channel(kind) => kind.fmt(f),
        }
    }
}
