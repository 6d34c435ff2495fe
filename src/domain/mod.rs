//! Domain types for chargeq
//!
//! - ChargeRequest: a user's request for energy, with its lifecycle state machine
//! - Pile: a charging pile and its operational status
//! - User: vehicle owner with battery capacity and charge level
//! - Bill: the billing record produced when a charge completes

pub mod bill;
pub mod pile;
pub mod request;
pub mod user;

pub use bill::Bill;
pub use pile::{Pile, PileStatus, PileType};
pub use request::{ChargeMode, ChargeRequest, RequestStatus};
pub use user::User;
