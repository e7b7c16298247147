//! Isolated cron turns: one scheduled agent turn from session resolution to
//! delivery and persistence, plus the `cronturn` binary wiring.

pub mod bootstrap;
pub mod cli;
pub mod delivery;
pub mod events;
pub mod isolated;
pub mod outbound;
pub mod security;

pub use isolated::{
    DeliveryOutcome, IsolatedTurnRunner, TurnDeps, TurnOptions, TurnOutcome, TurnRequest,
};
