//! chargeq - charging-pile request scheduler
//!
//! Vehicles submit charging requests into a holding area. A scheduler assigns
//! them to capacity-limited pile queues, and a monitor recovers requests when
//! a pile fails mid-service or comes back online.

pub mod billing;
pub mod capacity;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod estimator;
pub mod id;
pub mod monitor;
pub mod notify;
pub mod scheduler;
pub mod station;
pub mod store;

pub use error::{Result, StationError};
pub use station::Station;
