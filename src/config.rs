//! Engine configuration.
//!
//! Plain serde structs; reading them from a file is left to the caller.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::core::cell::CellTarget;
use crate::error::{Error, Result};
use crate::parallel::slice::PartitionStrategy;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads in the dispatcher pool.
    pub threads: usize,
    /// How passes are split between workers.
    pub partition: PartitionStrategy,
    /// How finely the cell grid divides the box.
    pub cells: CellTarget,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4);
        Self {
            threads,
            partition: PartitionStrategy::default(),
            cells: CellTarget::default(),
        }
    }
}

impl EngineConfig {
    /// Set the worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the partition strategy.
    pub fn with_partition(mut self, partition: PartitionStrategy) -> Self {
        self.partition = partition;
        self
    }

    /// Set the cell grid target.
    pub fn with_cells(mut self, cells: CellTarget) -> Self {
        self.cells = cells;
        self
    }

    /// Errors:
    /// - `Error::Configuration` for zero threads or an invalid cell target.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::Configuration("thread count must be > 0".into()));
        }
        self.cells.validate()
    }
}
