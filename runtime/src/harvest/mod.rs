//! Harvest engine: extraction, novelty filtering, scrolling, error backoff,
//! the per-topic loop, and the multi-topic orchestrator.

pub mod extract;
pub mod monitor;
pub mod novelty;
pub mod orchestrator;
pub mod scroll;
pub mod topic;
