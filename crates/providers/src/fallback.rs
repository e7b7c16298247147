//! Ordered fallback across model candidates.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! NotStarted -> Running(0)
//! Running(i) -> Succeeded(i) | FailedAttempt(i)
//! FailedAttempt(i) -> Running(i + 1) | Exhausted
//! ```
//!
//! Every attempt runs under its own timeout.  A timeout is an ordinary
//! failed attempt.

use std::future::Future;
use std::time::{Duration, Instant};

use ct_domain::error::{Error, Result};
use ct_domain::model::ModelRef;
use ct_domain::trace::TraceEvent;

use crate::selection::Candidate;

/// Outcome of one attempt, kept for diagnostics and session records.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub model_ref: ModelRef,
    pub duration_ms: u64,
    /// `None` for the successful attempt.
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct FallbackSuccess<T> {
    pub value: T,
    pub candidate: Candidate,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug)]
pub struct FallbackFailure {
    pub error: Error,
    pub attempts: Vec<AttemptRecord>,
}

/// States of the fallback loop.
#[derive(Debug)]
pub enum AttemptState<T> {
    NotStarted,
    Running { index: usize },
    Succeeded { index: usize, value: T },
    FailedAttempt { index: usize, error: Error },
    Exhausted { last_error: Error },
}

/// Try `candidates` in order until one succeeds.
///
/// With a single candidate its error is returned unchanged.  With more, an
/// exhausted chain yields [`Error::FallbackExhausted`] naming every
/// attempted ref and carrying the last cause.
pub async fn run_with_fallback<T, F, Fut>(
    candidates: &[Candidate],
    timeout: Duration,
    mut attempt: F,
) -> std::result::Result<FallbackSuccess<T>, FallbackFailure>
where
    F: FnMut(&Candidate) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts: Vec<AttemptRecord> = Vec::new();
    let mut state = AttemptState::NotStarted;

    loop {
        state = match state {
            AttemptState::NotStarted => {
                if candidates.is_empty() {
                    AttemptState::Exhausted {
                        last_error: Error::Other("no model candidates".into()),
                    }
                } else {
                    AttemptState::Running { index: 0 }
                }
            }

            AttemptState::Running { index } => {
                let candidate = &candidates[index];
                let start = Instant::now();
                let result = match tokio::time::timeout(timeout, attempt(candidate)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(format!(
                        "{} timed out after {}ms",
                        candidate.model_ref,
                        timeout.as_millis()
                    ))),
                };
                let duration_ms = start.elapsed().as_millis() as u64;
                attempts.push(AttemptRecord {
                    model_ref: candidate.model_ref.clone(),
                    duration_ms,
                    error: result.as_ref().err().map(ToString::to_string),
                });
                match result {
                    Ok(value) => AttemptState::Succeeded { index, value },
                    Err(error) => AttemptState::FailedAttempt { index, error },
                }
            }

            AttemptState::Succeeded { index, value } => {
                return Ok(FallbackSuccess {
                    value,
                    candidate: candidates[index].clone(),
                    attempts,
                });
            }

            AttemptState::FailedAttempt { index, error } => {
                let failed = &candidates[index].model_ref;
                tracing::warn!(
                    provider = %failed.provider,
                    model = %failed.model,
                    attempt = index + 1,
                    of = candidates.len(),
                    error = %error,
                    "model attempt failed"
                );
                match candidates.get(index + 1) {
                    Some(next) => {
                        TraceEvent::LlmFallback {
                            from_provider: failed.provider.clone(),
                            from_model: failed.model.clone(),
                            to_provider: next.model_ref.provider.clone(),
                            to_model: next.model_ref.model.clone(),
                            reason: error.to_string(),
                        }
                        .emit();
                        AttemptState::Running { index: index + 1 }
                    }
                    None => AttemptState::Exhausted { last_error: error },
                }
            }

            AttemptState::Exhausted { last_error } => {
                let error = if candidates.len() <= 1 {
                    last_error
                } else {
                    Error::FallbackExhausted {
                        attempted: attempts.iter().map(|a| a.model_ref.to_string()).collect(),
                        last_ref: candidates[candidates.len() - 1].model_ref.to_string(),
                        last: Box::new(last_error),
                    }
                };
                return Err(FallbackFailure { error, attempts });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_domain::model::ProviderKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chain(refs: &[&str]) -> Vec<Candidate> {
        refs.iter()
            .map(|r| Candidate {
                model_ref: ModelRef::parse(r, "openai").unwrap(),
                kind: ProviderKind::Embedded,
            })
            .collect()
    }

    fn fail(provider: &str) -> Error {
        Error::Provider {
            provider: provider.into(),
            message: "HTTP 503".into(),
        }
    }

    #[tokio::test]
    async fn first_success_wins() {
        let calls = AtomicUsize::new(0);
        let out = run_with_fallback(&chain(&["a/1", "b/2"]), Duration::from_secs(1), |c| {
            calls.fetch_add(1, Ordering::SeqCst);
            let label = c.model_ref.to_string();
            async move { Ok::<_, Error>(label) }
        })
        .await
        .unwrap();
        assert_eq!(out.value, "a/1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.attempts.len(), 1);
        assert!(out.attempts[0].error.is_none());
    }

    #[tokio::test]
    async fn k_failures_then_success() {
        let out = run_with_fallback(&chain(&["a/1", "b/2", "c/3", "d/4"]), Duration::from_secs(1), |c| {
            let provider = c.model_ref.provider.clone();
            async move {
                if provider == "c" {
                    Ok(provider)
                } else {
                    Err(fail(&provider))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out.candidate.model_ref.to_string(), "c/3");
        assert_eq!(out.attempts.len(), 3);
        assert!(out.attempts[0].error.is_some());
        assert!(out.attempts[1].error.is_some());
    }

    #[tokio::test]
    async fn timeout_advances_to_next() {
        let out = run_with_fallback(&chain(&["slow/1", "fast/2"]), Duration::from_millis(50), |c| {
            let provider = c.model_ref.provider.clone();
            async move {
                if provider == "slow" {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok::<_, Error>(provider)
            }
        })
        .await
        .unwrap();
        assert_eq!(out.value, "fast");
        assert_eq!(out.attempts.len(), 2);
        assert!(out.attempts[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn single_candidate_returns_raw_error() {
        let err = run_with_fallback(&chain(&["a/1"]), Duration::from_millis(20), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), Error>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err.error, Error::Timeout(_)));
        assert_eq!(err.attempts.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_aggregates() {
        let err = run_with_fallback(&chain(&["a/1", "b/2"]), Duration::from_secs(1), |c| {
            let provider = c.model_ref.provider.clone();
            async move { Err::<(), _>(fail(&provider)) }
        })
        .await
        .unwrap_err();
        match err.error {
            Error::FallbackExhausted {
                attempted,
                last_ref,
                last,
            } => {
                assert_eq!(attempted, vec!["a/1", "b/2"]);
                assert_eq!(last_ref, "b/2");
                assert!(matches!(*last, Error::Provider { ref provider, .. } if provider == "b"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.attempts.len(), 2);
    }

    #[tokio::test]
    async fn empty_chain_fails() {
        let err = run_with_fallback(&[], Duration::from_secs(1), |_| async { Ok::<(), Error>(()) })
            .await
            .unwrap_err();
        assert!(err.attempts.is_empty());
    }
}
