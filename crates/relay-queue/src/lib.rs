//! # Relay Queue
//!
//! The queue/priority router: tasks are routed once, at enqueue time, to a
//! named lane; worker pools consume lanes independently. Priority exists
//! only as lane assignment — within a lane order stays FIFO among ready
//! items. Retry backoff is expressed as a `not_before` hold on the
//! dispatch, so waiting work sits in the lane instead of being polled.

pub mod config;
pub mod manager;
pub mod router;
pub mod types;

pub use config::QueueConfig;
pub use manager::{DispatchQueue, LaneQueues};
pub use router::LaneRouter;
pub use types::{Dispatch, Lane, LaneStats};
