//! Candidate-partner enumeration.
//!
//! Up/down convention: for a target `i`, UP yields the partners that `i`
//! owns, DOWN yields the partners that own `i`. Querying every particle once
//! with UP produces each unordered pair exactly once.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::cell::{CellId, CellIndex};
use crate::core::lattice::SiteLattice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Up,
    Down,
    Both,
}

/// A lazy, finite sequence of candidate partners for one target.
///
/// Configure with `set_target` and `set_direction`, arm with `reset`, then
/// drain with `next`. The sequence is empty before the first `reset` and
/// stays exhausted until the next one.
pub trait NeighborIterator: Iterator<Item = usize> {
    fn set_target(&mut self, target: usize);
    fn set_direction(&mut self, direction: Direction);
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    OwnBefore,
    OwnAfter,
    UpCells,
    DownCells,
}

impl Stage {
    fn sequence(direction: Direction) -> &'static [Stage] {
        match direction {
            Direction::Up => &[Stage::OwnAfter, Stage::UpCells],
            Direction::Down => &[Stage::OwnBefore, Stage::DownCells],
            Direction::Both => &[
                Stage::OwnBefore,
                Stage::OwnAfter,
                Stage::UpCells,
                Stage::DownCells,
            ],
        }
    }
}

/// Neighbor iterator over a [`CellIndex`].
///
/// Within the target's own cell the member order decides ownership; across
/// cells the half-stencil does.
#[derive(Debug, Clone)]
pub struct CellNeighborIterator<'a, const D: usize> {
    index: &'a CellIndex<D>,
    target: Option<usize>,
    direction: Direction,
    cell: CellId,
    own_pos: usize,
    stages: &'static [Stage],
    stage: usize,
    slot: usize,
    cursor: usize,
}

impl<'a, const D: usize> CellNeighborIterator<'a, D> {
    pub fn new(index: &'a CellIndex<D>) -> Self {
        Self {
            index,
            target: None,
            direction: Direction::Up,
            cell: 0,
            own_pos: 0,
            stages: &[],
            stage: 0,
            slot: 0,
            cursor: 0,
        }
    }

    fn advance_stage(&mut self) {
        self.stage += 1;
        self.slot = 0;
        self.cursor = match self.stages.get(self.stage) {
            Some(Stage::OwnAfter) => self.own_pos + 1,
            _ => 0,
        };
    }
}

impl<const D: usize> NeighborIterator for CellNeighborIterator<'_, D> {
    fn set_target(&mut self, target: usize) {
        self.target = Some(target);
        self.stages = &[];
    }

    fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
        self.stages = &[];
    }

    fn reset(&mut self) {
        self.stages = &[];
        let Some(target) = self.target else {
            return;
        };
        let Some(cell) = self.index.cell_of(target) else {
            return;
        };
        let Some(own_pos) = self.index.members(cell).iter().position(|&m| m == target) else {
            return;
        };
        self.cell = cell;
        self.own_pos = own_pos;
        self.stages = Stage::sequence(self.direction);
        self.stage = 0;
        self.slot = 0;
        self.cursor = if self.stages.first() == Some(&Stage::OwnAfter) {
            own_pos + 1
        } else {
            0
        };
    }
}

impl<const D: usize> Iterator for CellNeighborIterator<'_, D> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = self.index;
        loop {
            let stage = *self.stages.get(self.stage)?;
            let own = index.members(self.cell);
            match stage {
                Stage::OwnBefore => {
                    if self.cursor < self.own_pos {
                        self.cursor += 1;
                        return Some(own[self.cursor - 1]);
                    }
                }
                Stage::OwnAfter => {
                    if self.cursor < own.len() {
                        self.cursor += 1;
                        return Some(own[self.cursor - 1]);
                    }
                }
                Stage::UpCells | Stage::DownCells => {
                    let cell = index.cell(self.cell);
                    let adjacent = if stage == Stage::UpCells {
                        cell.up()
                    } else {
                        cell.down()
                    };
                    while let Some(&other) = adjacent.get(self.slot) {
                        let members = index.members(other);
                        if self.cursor < members.len() {
                            self.cursor += 1;
                            return Some(members[self.cursor - 1]);
                        }
                        self.slot += 1;
                        self.cursor = 0;
                    }
                }
            }
            self.advance_stage();
        }
    }
}

/// Neighbor iterator over a [`SiteLattice`].
#[derive(Debug, Clone)]
pub struct LatticeNeighborIterator<'a, const D: usize> {
    lattice: &'a SiteLattice<D>,
    target: Option<usize>,
    direction: Direction,
    lists: [&'a [usize]; 2],
    list: usize,
    cursor: usize,
}

impl<'a, const D: usize> LatticeNeighborIterator<'a, D> {
    pub fn new(lattice: &'a SiteLattice<D>) -> Self {
        Self {
            lattice,
            target: None,
            direction: Direction::Up,
            lists: [&[], &[]],
            list: 0,
            cursor: 0,
        }
    }
}

impl<const D: usize> NeighborIterator for LatticeNeighborIterator<'_, D> {
    fn set_target(&mut self, target: usize) {
        self.target = Some(target);
        self.lists = [&[], &[]];
    }

    fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
        self.lists = [&[], &[]];
    }

    fn reset(&mut self) {
        let lattice = self.lattice;
        self.list = 0;
        self.cursor = 0;
        self.lists = match self.target {
            None => [&[], &[]],
            Some(site) => match self.direction {
                Direction::Up => [lattice.up(site), &[]],
                Direction::Down => [lattice.down(site), &[]],
                Direction::Both => [lattice.down(site), lattice.up(site)],
            },
        };
    }
}

impl<const D: usize> Iterator for LatticeNeighborIterator<'_, D> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.list < self.lists.len() {
            if let Some(&n) = self.lists[self.list].get(self.cursor) {
                self.cursor += 1;
                return Some(n);
            }
            self.list += 1;
            self.cursor = 0;
        }
        None
    }
}

/// The neighbor strategy a world was built with.
#[derive(Debug, Clone)]
pub enum NeighborIndex<const D: usize> {
    /// Dynamic cells, reassigned as particles move.
    Cells(CellIndex<D>),
    /// One particle per fixed lattice site.
    Lattice(SiteLattice<D>),
}

impl<const D: usize> NeighborIndex<D> {
    pub fn enumerator(&self) -> Enumerator<'_, D> {
        match self {
            NeighborIndex::Cells(index) => Enumerator::Cells(CellNeighborIterator::new(index)),
            NeighborIndex::Lattice(lattice) => {
                Enumerator::Lattice(LatticeNeighborIterator::new(lattice))
            }
        }
    }

    /// Number of spatial domains (cells or sites) available for partitioning.
    pub fn domain_len(&self) -> usize {
        match self {
            NeighborIndex::Cells(index) => index.len(),
            NeighborIndex::Lattice(lattice) => lattice.len(),
        }
    }

    /// Append the particles living in `domains` to `out`, domain by domain.
    pub fn domain_targets(&self, domains: Range<usize>, out: &mut Vec<usize>) {
        match self {
            NeighborIndex::Cells(index) => {
                for cell in domains.start..domains.end.min(index.len()) {
                    out.extend_from_slice(index.members(cell));
                }
            }
            NeighborIndex::Lattice(lattice) => {
                out.extend(domains.start..domains.end.min(lattice.len()));
            }
        }
    }

    pub fn cells(&self) -> Option<&CellIndex<D>> {
        match self {
            NeighborIndex::Cells(index) => Some(index),
            NeighborIndex::Lattice(_) => None,
        }
    }
}

/// Either neighbor iterator behind one type.
#[derive(Debug, Clone)]
pub enum Enumerator<'a, const D: usize> {
    Cells(CellNeighborIterator<'a, D>),
    Lattice(LatticeNeighborIterator<'a, D>),
}

impl<const D: usize> NeighborIterator for Enumerator<'_, D> {
    fn set_target(&mut self, target: usize) {
        match self {
            Enumerator::Cells(it) => it.set_target(target),
            Enumerator::Lattice(it) => it.set_target(target),
        }
    }

    fn set_direction(&mut self, direction: Direction) {
        match self {
            Enumerator::Cells(it) => it.set_direction(direction),
            Enumerator::Lattice(it) => it.set_direction(direction),
        }
    }

    fn reset(&mut self) {
        match self {
            Enumerator::Cells(it) => it.reset(),
            Enumerator::Lattice(it) => it.reset(),
        }
    }
}

impl<const D: usize> Iterator for Enumerator<'_, D> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            Enumerator::Cells(it) => it.next(),
            Enumerator::Lattice(it) => it.next(),
        }
    }
}

/// Materialized candidate lists for a set of targets, stored CSR-style.
///
/// Buffers are reused across rebuilds. The list remembers the world
/// generation it was built against so owners can tell when it went stale.
#[derive(Debug, Clone, Default)]
pub struct NeighborList {
    generation: Option<u64>,
    direction: Direction,
    targets: Vec<usize>,
    offsets: Vec<usize>,
    partners: Vec<usize>,
}

impl NeighborList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild for an explicit list of targets.
    pub fn rebuild<const D: usize>(
        &mut self,
        index: &NeighborIndex<D>,
        targets: impl IntoIterator<Item = usize>,
        direction: Direction,
        generation: u64,
    ) {
        self.targets.clear();
        self.targets.extend(targets);
        self.fill(index, direction, generation);
    }

    /// Rebuild for every particle living in a range of cells (or sites).
    pub fn rebuild_domains<const D: usize>(
        &mut self,
        index: &NeighborIndex<D>,
        domains: Range<usize>,
        direction: Direction,
        generation: u64,
    ) {
        self.targets.clear();
        index.domain_targets(domains, &mut self.targets);
        self.fill(index, direction, generation);
    }

    fn fill<const D: usize>(&mut self, index: &NeighborIndex<D>, direction: Direction, generation: u64) {
        self.offsets.clear();
        self.partners.clear();
        self.offsets.push(0);
        let mut it = index.enumerator();
        it.set_direction(direction);
        for &target in &self.targets {
            it.set_target(target);
            it.reset();
            self.partners.extend(&mut it);
            self.offsets.push(self.partners.len());
        }
        self.direction = direction;
        self.generation = Some(generation);
    }

    /// Whether the list was built for `generation` in `direction`.
    pub fn is_current(&self, generation: u64, direction: Direction) -> bool {
        self.generation == Some(generation) && self.direction == direction
    }

    pub fn invalidate(&mut self) {
        self.generation = None;
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Partners of the `k`-th target.
    pub fn partners(&self, k: usize) -> &[usize] {
        match (self.offsets.get(k), self.offsets.get(k + 1)) {
            (Some(&a), Some(&b)) => &self.partners[a..b],
            _ => &[],
        }
    }

    /// `(target, partners)` in target order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        self.targets
            .iter()
            .enumerate()
            .map(|(k, &t)| (t, self.partners(k)))
    }

    /// Total number of (target, partner) entries.
    pub fn pair_count(&self) -> usize {
        self.partners.len()
    }
}
