//! Listener, admission control and request pipeline of the cachet proxy.

pub mod admission;
mod coalesce;
pub mod master;
pub mod pipeline;
mod worker;

pub use admission::{Admission, RefillTask, TokenBucket, MIN_REFILL_INTERVAL};
pub use master::{build_pipeline, connect_store, Master};
pub use pipeline::{Pipeline, PipelineSettings};
