//! Executor placement for the Foreman CI scheduler.
//!
//! Places tasks on idle executors, holding back capacity that forecast load
//! will need. Leases per-node workspaces and keeps nodes connected according
//! to their retention policy.

pub mod balancer;
pub mod checker;
pub mod demand;
pub mod error;
pub mod forecast;
pub mod mapping;
pub mod nodes;
pub mod retention;
pub mod scheduler;
pub mod slot;
pub mod timeline;
pub mod workspace;
pub mod worksheet;

#[cfg(test)]
mod testing;

pub use balancer::{ExhaustiveBalancer, GreedyBalancer, LoadBalancer};
pub use checker::RetentionChecker;
pub use demand::{DemandSource, NoDemand, WaitingQueue};
pub use error::{SchedulerError, SchedulerResult};
pub use forecast::{FutureLoad, LoadPredictor, ReservationPredictor};
pub use mapping::{Execution, Mapping, WorkUnit, WorkUnitContext};
pub use nodes::NodeRegistry;
pub use retention::{
    AvailabilityWindow, DemandRetention, RetentionAction, RetentionCheck, RetentionPolicy, ScheduledRetention,
};
pub use scheduler::Scheduler;
pub use slot::{ExecutorSlot, SlotArena, SlotId};
pub use timeline::Timeline;
pub use workspace::{WorkspaceList, WorkspaceRegistry};
pub use worksheet::{ExecutorChunk, MappingWorksheet, WorkChunk, WorksheetContext};
