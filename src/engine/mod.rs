//! Search engine: strategy executors and the orchestrator that drives them.

mod orchestrator;
mod strategy;

pub use orchestrator::{merge_results, Orchestrator, SearchOptions};
pub use strategy::{execute, fallback_chain, fan_out, Strategy};
