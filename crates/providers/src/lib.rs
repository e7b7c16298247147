pub mod catalog;
pub mod fallback;
pub mod openai_compat;
pub mod process;
pub mod selection;
pub mod traits;
pub(crate) mod util;

// Re-exports for convenience.
pub use catalog::CatalogModelStatus;
pub use fallback::{run_with_fallback, AttemptRecord, AttemptState, FallbackFailure, FallbackSuccess};
pub use openai_compat::OpenAiCompatRunner;
pub use process::ProcessAgentRunner;
pub use selection::{resolve_model_selection, Candidate, ModelOverrides, ModelSelection};
pub use traits::{AgentRunner, ModelStatusProvider, PromptContext};
