pub mod helpers;
pub mod persist;
pub mod prompt;
pub mod run;

pub use run::{
    AttemptSummary, DeliveryOutcome, IsolatedTurnRunner, TurnDeps, TurnOptions, TurnOutcome,
    TurnRequest,
};
