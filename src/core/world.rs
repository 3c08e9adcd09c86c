//! The shared simulation state: particles, box and neighbor index.
//!
//! `World` owns everything a pass reads. The index only stores particle ids,
//! never references, so any change to the arena goes through a `World`
//! method that brings the index back in sync before returning. Each such
//! change bumps `generation`, which cached neighbor lists compare against.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::core::cell::{CellIndex, CellTarget};
use crate::core::geometry::Boundary;
use crate::core::lattice::SiteLattice;
use crate::core::neighbor::{Enumerator, NeighborIndex};
use crate::core::particle::{Particle, ParticleArena};
use crate::error::{Error, Result};

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(0);

fn next_world_id() -> u64 {
    NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub struct World<const D: usize> {
    id: u64,
    particles: ParticleArena<D>,
    boundary: Box<dyn Boundary<D>>,
    neighbors: NeighborIndex<D>,
    generation: u64,
}

impl<const D: usize> World<D> {
    /// World indexed by a cell grid whose cells are at least `range` wide.
    ///
    /// Errors:
    /// - `Error::Configuration` if the cell target or range does not fit the box.
    pub fn with_cells(
        particles: ParticleArena<D>,
        boundary: Box<dyn Boundary<D>>,
        target: CellTarget,
        range: f64,
    ) -> Result<Self> {
        let mut index = CellIndex::build(boundary.as_ref(), target, range)?;
        index.assign_all(&particles);
        Ok(Self {
            id: next_world_id(),
            particles,
            boundary,
            neighbors: NeighborIndex::Cells(index),
            generation: 0,
        })
    }

    /// World where particle `k` sits on lattice site `k` for good.
    ///
    /// Errors:
    /// - `Error::Configuration` if the particle count differs from the site count.
    pub fn with_lattice(
        particles: ParticleArena<D>,
        boundary: Box<dyn Boundary<D>>,
        lattice: SiteLattice<D>,
    ) -> Result<Self> {
        if particles.len() != lattice.len() {
            return Err(Error::Configuration(format!(
                "lattice has {} sites but {} particles were given",
                lattice.len(),
                particles.len()
            )));
        }
        Ok(Self {
            id: next_world_id(),
            particles,
            boundary,
            neighbors: NeighborIndex::Lattice(lattice),
            generation: 0,
        })
    }

    pub fn particles(&self) -> &ParticleArena<D> {
        &self.particles
    }

    pub fn boundary(&self) -> &dyn Boundary<D> {
        self.boundary.as_ref()
    }

    pub fn neighbors(&self) -> &NeighborIndex<D> {
        &self.neighbors
    }

    /// Process-unique identity. Generations are only comparable between
    /// states of the same world.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Counter bumped whenever membership, composition or geometry changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn enumerator(&self) -> Enumerator<'_, D> {
        self.neighbors.enumerator()
    }

    /// Check that `i` names a particle.
    pub fn check_id(&self, i: usize) -> Result<()> {
        if i < self.particles.len() {
            Ok(())
        } else {
            Err(Error::InvalidParam(format!(
                "particle id {i} out of range (n = {})",
                self.particles.len()
            )))
        }
    }

    /// Mutable particles next to the read-only box.
    ///
    /// Callers that move particles through this must follow up with
    /// [`World::relocate`] or [`World::sync_all`].
    pub fn parts_mut(&mut self) -> (&mut ParticleArena<D>, &dyn Boundary<D>) {
        (&mut self.particles, self.boundary.as_ref())
    }

    /// Bring particle `i`'s cell in line with its position.
    pub fn relocate(&mut self, i: usize) -> bool {
        let NeighborIndex::Cells(index) = &mut self.neighbors else {
            return false;
        };
        let moved = index.relocate(i, self.particles.position(i));
        if moved {
            self.generation += 1;
        }
        moved
    }

    /// Relocate every particle; returns whether any membership changed.
    pub fn sync_all(&mut self) -> bool {
        let NeighborIndex::Cells(index) = &mut self.neighbors else {
            return false;
        };
        let mut moved = false;
        for (i, r) in self.particles.positions().iter().enumerate() {
            moved |= index.relocate(i, r);
        }
        if moved {
            self.generation += 1;
        }
        moved
    }

    /// Swap in a new box. Cell counts are recomputed for the new shape.
    ///
    /// Returns whether the cell grid had to be rebuilt.
    pub fn resize(&mut self, boundary: Box<dyn Boundary<D>>) -> Result<bool> {
        let rebuilt = match &mut self.neighbors {
            NeighborIndex::Cells(index) => index.resize(boundary.as_ref(), &self.particles)?,
            NeighborIndex::Lattice(_) => false,
        };
        self.boundary = boundary;
        self.generation += 1;
        debug!(rebuilt, generation = self.generation, "world resized");
        Ok(rebuilt)
    }

    /// Rebuild the cell grid for a new interaction range.
    pub fn set_range(&mut self, range: f64) -> Result<()> {
        let NeighborIndex::Cells(index) = &mut self.neighbors else {
            return Ok(());
        };
        let mut rebuilt = CellIndex::build(self.boundary.as_ref(), index.target(), range)?;
        rebuilt.assign_all(&self.particles);
        *index = rebuilt;
        self.generation += 1;
        Ok(())
    }

    /// Replace particles and box wholesale, keeping the index kind.
    ///
    /// A cell world is re-gridded for `range` with its current target.
    /// The generation keeps counting up so cached lists never match by
    /// accident.
    pub fn rebuild(
        &mut self,
        particles: ParticleArena<D>,
        boundary: Box<dyn Boundary<D>>,
        range: f64,
    ) -> Result<()> {
        match &mut self.neighbors {
            NeighborIndex::Cells(index) => {
                let mut rebuilt = CellIndex::build(boundary.as_ref(), index.target(), range)?;
                rebuilt.assign_all(&particles);
                *index = rebuilt;
            }
            NeighborIndex::Lattice(lattice) => {
                if particles.len() != lattice.len() {
                    return Err(Error::Configuration(format!(
                        "lattice has {} sites but {} particles were given",
                        lattice.len(),
                        particles.len()
                    )));
                }
            }
        }
        self.particles = particles;
        self.boundary = boundary;
        self.generation += 1;
        debug!(
            particles = self.particles.len(),
            generation = self.generation,
            "world rebuilt"
        );
        Ok(())
    }

    /// Interaction range the cell grid was built for, if any.
    pub fn range(&self) -> Option<f64> {
        self.neighbors.cells().map(CellIndex::range)
    }

    /// Append a particle and index it. Returns its id.
    ///
    /// Errors:
    /// - `Error::Configuration` on a lattice world, whose composition is fixed.
    pub fn add_particle(&mut self, p: Particle<D>) -> Result<usize> {
        let NeighborIndex::Cells(index) = &mut self.neighbors else {
            return Err(Error::Configuration(
                "cannot add particles to a fixed lattice".into(),
            ));
        };
        let id = self.particles.push(p);
        index.relocate(id, self.particles.position(id));
        self.generation += 1;
        Ok(id)
    }

    /// Remove particle `i`; the last particle takes over its id.
    ///
    /// Returns the removed particle and the old id of the one that moved.
    pub fn remove_particle(&mut self, i: usize) -> Result<(Particle<D>, Option<usize>)> {
        let NeighborIndex::Cells(index) = &mut self.neighbors else {
            return Err(Error::Configuration(
                "cannot remove particles from a fixed lattice".into(),
            ));
        };
        let removed = self.particles.swap_remove(i)?;
        index.assign_all(&self.particles);
        self.generation += 1;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::RectangularBox;
    use crate::core::lattice::LatticeStencil;

    fn small_world() -> Result<World<2>> {
        let mut arena = ParticleArena::new();
        arena.push(Particle::new([0.5, 0.5], [1.0, 0.0], 1.0, 1.0)?);
        arena.push(Particle::new([5.0, 5.0], [0.0, 0.0], 1.0, 1.0)?);
        let b = RectangularBox::periodic([10.0, 10.0])?;
        World::with_cells(arena, Box::new(b), CellTarget::MinimumSize, 1.0)
    }

    #[test]
    fn relocation_bumps_generation_only_on_change() -> Result<()> {
        let mut world = small_world()?;
        assert!(!world.sync_all());
        assert_eq!(world.generation(), 0);

        world.parts_mut().0.drift(0.2);
        assert!(!world.relocate(0));
        world.parts_mut().0.drift(1.0);
        assert!(world.relocate(0));
        assert_eq!(world.generation(), 1);
        let cells = world.neighbors().cells().map(|c| c.cell_of(0));
        assert_eq!(cells, Some(Some(10)));
        Ok(())
    }

    #[test]
    fn add_and_remove_keep_index_in_sync() -> Result<()> {
        let mut world = small_world()?;
        let id = world.add_particle(Particle::new([9.5, 9.5], [0.0; 2], 1.0, 1.0)?)?;
        assert_eq!(id, 2);
        let (removed, moved) = world.remove_particle(0)?;
        assert_eq!(removed.r, [0.5, 0.5]);
        assert_eq!(moved, Some(2));
        assert_eq!(world.particles().position(0), &[9.5, 9.5]);
        let index = world.neighbors().cells().ok_or_else(|| Error::InvalidParam("no cells".into()))?;
        assert_eq!(index.cell_of(0), Some(99));
        assert_eq!(index.cell_of(2), None);
        assert!(world.check_id(2).is_err());
        Ok(())
    }

    #[test]
    fn resize_reports_rebuilds() -> Result<()> {
        let mut world = small_world()?;
        assert!(!world.resize(Box::new(RectangularBox::periodic([10.5, 10.5])?))?);
        assert!(world.resize(Box::new(RectangularBox::periodic([20.0, 20.0])?))?);
        assert_eq!(world.generation(), 2);
        assert!(world
            .resize(Box::new(RectangularBox::periodic([0.5, 20.0])?))
            .is_err());
        Ok(())
    }

    #[test]
    fn rebuild_continues_generation() -> Result<()> {
        let mut world = small_world()?;
        world.parts_mut().0.drift(2.0);
        world.sync_all();
        let before = world.generation();
        let mut arena = ParticleArena::new();
        arena.push(Particle::new([1.5, 1.5], [0.0; 2], 1.0, 1.0)?);
        world.rebuild(arena, Box::new(RectangularBox::periodic([6.0, 6.0])?), 2.0)?;
        assert!(world.generation() > before);
        assert_eq!(world.particles().len(), 1);
        assert_eq!(world.range(), Some(2.0));
        let index = world.neighbors().cells().ok_or_else(|| Error::InvalidParam("no cells".into()))?;
        assert_eq!(index.counts(), [3, 3]);
        assert_eq!(index.cell_of(0), Some(0));
        Ok(())
    }

    #[test]
    fn worlds_have_distinct_ids() -> Result<()> {
        let a = small_world()?;
        let b = small_world()?;
        assert_ne!(a.id(), b.id());
        assert_eq!(a.generation(), b.generation());
        Ok(())
    }

    #[test]
    fn lattice_world_has_fixed_composition() -> Result<()> {
        let lattice = SiteLattice::new([2, 2], [true, true], LatticeStencil::VonNeumann)?;
        let b = RectangularBox::periodic([2.0, 2.0])?;
        let arena = ParticleArena::random_gas(3, &b, 0.1, 1.0, Some(1))?;
        assert!(World::with_lattice(arena, Box::new(b.clone()), lattice.clone()).is_err());

        let arena = ParticleArena::random_gas(4, &b, 0.1, 1.0, Some(1))?;
        let mut world = World::with_lattice(arena, Box::new(b), lattice)?;
        assert!(world.add_particle(Particle::new([0.0; 2], [0.0; 2], 1.0, 0.1)?).is_err());
        assert!(world.remove_particle(0).is_err());
        assert!(!world.sync_all());
        Ok(())
    }
}
