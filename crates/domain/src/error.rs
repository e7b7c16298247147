/// Shared error type used across all cronturn crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// The session store could not be read; the turn aborts before any
    /// model invocation.
    #[error("session store unavailable at {path}: {message}")]
    StoreUnavailable { path: String, message: String },

    #[error("model not allowed: {model_ref}")]
    ModelNotAllowed { model_ref: String },

    /// Every candidate in the fallback chain failed.
    #[error("all models failed ({}); last {last_ref}: {last}", attempted.join(", "))]
    FallbackExhausted {
        attempted: Vec<String>,
        last_ref: String,
        last: Box<Error>,
    },

    #[error("delivery: {0}")]
    Delivery(String),

    #[error("persist: {0}")]
    Persist(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_names_last_candidate() {
        let err = Error::FallbackExhausted {
            attempted: vec!["openai/gpt-4o".into(), "anthropic/claude".into()],
            last_ref: "anthropic/claude".into(),
            last: Box::new(Error::Timeout("60000ms".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("openai/gpt-4o, anthropic/claude"));
        assert!(msg.ends_with("last anthropic/claude: timeout: 60000ms"));
    }
}
