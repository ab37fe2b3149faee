//! Core domain types and traits for the Foreman CI scheduler.
//!
//! This crate contains:
//! - Resource identifiers
//! - Node identity and the `Computer` trait the scheduler drives
//! - Label expressions used to constrain where work may run
//! - Tasks and their schedulable sub-units

pub mod error;
pub mod id;
pub mod label;
pub mod node;
pub mod task;

pub use error::{Error, Result};
pub use id::ResourceId;
pub use label::Label;
pub use node::{Computer, NodeDirectory, NodeId};
pub use task::{SubTask, Task};
