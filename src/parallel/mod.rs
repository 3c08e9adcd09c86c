//! Multi-threaded pair passes.

pub mod accumulator;
pub mod dispatcher;
pub mod slice;
pub mod task;

pub use accumulator::{AggregateResult, PassAccumulator};
pub use dispatcher::ParallelDispatcher;
pub use slice::{partition, PartitionStrategy, SliceDomain, ThreadSlice};
pub use task::{CollisionSearch, EnergySum, PassContext, PassTask};
