//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace:
//! notification shapes, the sink capability, configuration and errors.
//! Business crates depend on this crate, never the other way round.
//!
//! ## Notification model
//! - `KubeEvent`: a cluster event that was ADDED or UPDATEd
//! - `KubeObject`: any resource, used for periodic descriptions

mod config;
mod error;
mod event;
mod object;
mod sink;

pub use config::*;
pub use error::*;
pub use event::*;
pub use object::*;
pub use sink::*;
