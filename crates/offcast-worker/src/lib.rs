#![forbid(unsafe_code)]

//! Download execution for offcast.
//!
//! One [`ItemWorker`] drives one item: it pulls the persisted task list,
//! fetches with a bounded pool in planner order, streams each body to a
//! temporary file that is atomically renamed on success, and funnels every
//! byte count and state change through the [`progress::ProgressAggregator`]
//! so persistence always precedes notification.
//!
//! Pause and cancel are cooperative: a pause token asks in-flight fetches
//! to surrender resume tokens, a cancel token aborts them outright.

mod error;
mod fetch;
pub mod progress;
mod worker;

pub use error::{WorkerError, WorkerResult};
pub use progress::ProgressAggregator;
pub use worker::{ItemWorker, WorkerConfig, WorkerHandle};
