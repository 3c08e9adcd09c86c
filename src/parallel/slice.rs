//! Work partitioning: which targets each worker owns.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::neighbor::{Direction, NeighborList};
use crate::core::world::World;

/// What a worker's contiguous range counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Chunks of particle ids.
    #[default]
    Particles,
    /// Chunks of cell ids (site ids on a lattice).
    Cells,
}

/// Split `0..len` into `parts` contiguous ranges covering it exactly.
///
/// The first `len % parts` ranges get one extra element. Returns no ranges
/// when `parts` is zero.
pub fn partition(len: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }
    let base = len / parts;
    let extra = len % parts;
    let mut start = 0;
    (0..parts)
        .map(|k| {
            let size = base + usize::from(k < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

/// One worker's share of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceDomain {
    Particles(Range<usize>),
    Cells(Range<usize>),
}

impl SliceDomain {
    pub fn range(&self) -> &Range<usize> {
        match self {
            SliceDomain::Particles(r) | SliceDomain::Cells(r) => r,
        }
    }

    /// Slices for every worker under `strategy` for the given world.
    pub fn split<const D: usize>(
        world: &World<D>,
        strategy: PartitionStrategy,
        workers: usize,
    ) -> Vec<SliceDomain> {
        match strategy {
            PartitionStrategy::Particles => partition(world.particles().len(), workers)
                .into_iter()
                .map(SliceDomain::Particles)
                .collect(),
            PartitionStrategy::Cells => partition(world.neighbors().domain_len(), workers)
                .into_iter()
                .map(SliceDomain::Cells)
                .collect(),
        }
    }
}

/// A worker's slice together with its private neighbor cache.
#[derive(Debug)]
pub struct ThreadSlice {
    worker: usize,
    domain: SliceDomain,
    world: Option<u64>,
    cache: NeighborList,
}

impl ThreadSlice {
    pub fn new(worker: usize, domain: SliceDomain) -> Self {
        Self {
            worker,
            domain,
            world: None,
            cache: NeighborList::new(),
        }
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn domain(&self) -> &SliceDomain {
        &self.domain
    }

    /// Point the slice at a new domain. The cache is dropped if it differs.
    pub fn set_domain(&mut self, domain: SliceDomain) {
        if self.domain != domain {
            self.domain = domain;
            self.cache.invalidate();
        }
    }

    /// Candidate lists for this slice, rebuilt if the world or direction
    /// moved on since the last pass, or if this is a different world.
    pub fn neighbors<const D: usize>(&mut self, world: &World<D>, direction: Direction) -> &NeighborList {
        if self.world != Some(world.id()) {
            self.world = Some(world.id());
            self.cache.invalidate();
        }
        let generation = world.generation();
        if !self.cache.is_current(generation, direction) {
            match &self.domain {
                SliceDomain::Particles(range) => {
                    let end = range.end.min(world.particles().len());
                    let start = range.start.min(end);
                    self.cache
                        .rebuild(world.neighbors(), start..end, direction, generation);
                }
                SliceDomain::Cells(range) => {
                    self.cache
                        .rebuild_domains(world.neighbors(), range.clone(), direction, generation);
                }
            }
            debug!(
                worker = self.worker,
                generation,
                targets = self.cache.targets().len(),
                pairs = self.cache.pair_count(),
                "neighbor cache refreshed"
            );
        }
        &self.cache
    }
}
