//! The facade an outer integrator drives.
//!
//! `Engine` ties a pair model to a shared [`World`] and a worker pool. Every
//! mutating call takes the world's write lock between passes and leaves the
//! neighbor index in sync with the particle positions.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::geometry::Boundary;
use crate::core::kinematics::{Collision, PairInteraction};
use crate::core::lattice::SiteLattice;
use crate::core::particle::{Particle, ParticleArena};
use crate::core::world::World;
use crate::error::Result;
use crate::parallel::accumulator::AggregateResult;
use crate::parallel::dispatcher::ParallelDispatcher;
use crate::parallel::task::{CollisionSearch, EnergySum, PassTask};

#[derive(Debug)]
pub struct Engine<const D: usize, M> {
    config: EngineConfig,
    model: Arc<M>,
    world: Arc<RwLock<World<D>>>,
    dispatcher: ParallelDispatcher<D>,
}

impl<const D: usize, M> Engine<D, M>
where
    M: PairInteraction<D> + 'static,
{
    /// Engine over a cell-indexed world sized for `model`'s range.
    ///
    /// Errors:
    /// - `Error::Configuration` for an invalid config or a range that does
    ///   not fit the box.
    pub fn new(
        config: EngineConfig,
        model: M,
        particles: ParticleArena<D>,
        boundary: Box<dyn Boundary<D>>,
    ) -> Result<Self> {
        config.validate()?;
        let range = grid_range(&model, &particles, boundary.as_ref(), None);
        let world = World::with_cells(particles, boundary, config.cells, range)?;
        Self::assemble(config, model, world)
    }

    /// Engine over a fixed lattice, one particle per site.
    pub fn with_lattice(
        config: EngineConfig,
        model: M,
        particles: ParticleArena<D>,
        boundary: Box<dyn Boundary<D>>,
        lattice: SiteLattice<D>,
    ) -> Result<Self> {
        config.validate()?;
        let world = World::with_lattice(particles, boundary, lattice)?;
        Self::assemble(config, model, world)
    }

    fn assemble(config: EngineConfig, model: M, world: World<D>) -> Result<Self> {
        let dispatcher = ParallelDispatcher::new(config.threads, config.partition)?;
        info!(
            particles = world.particles().len(),
            threads = config.threads,
            partition = ?config.partition,
            "engine ready"
        );
        Ok(Self {
            config,
            model: Arc::new(model),
            world: Arc::new(RwLock::new(world)),
            dispatcher,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Read access to the shared world. Do not hold the guard across a pass.
    pub fn world(&self) -> RwLockReadGuard<'_, World<D>> {
        self.world.read()
    }

    /// Replace all particles and the box, re-gridding for the new composition.
    ///
    /// An empty arena keeps the current range.
    pub fn rebuild(&mut self, particles: ParticleArena<D>, boundary: Box<dyn Boundary<D>>) -> Result<()> {
        let mut world = self.world.write();
        let range = grid_range(self.model.as_ref(), &particles, boundary.as_ref(), world.range());
        world.rebuild(particles, boundary, range)
    }

    /// Change the box shape. Returns whether the cell grid was rebuilt.
    pub fn resize(&mut self, boundary: Box<dyn Boundary<D>>) -> Result<bool> {
        self.world.write().resize(boundary)
    }

    /// Absolute time of the next event between `i` and `j`.
    ///
    /// Errors:
    /// - `Error::InvalidParam` for an unknown id.
    /// - `Error::NumericAnomaly` if the prediction cannot be trusted.
    pub fn time_to_collision(&self, i: usize, j: usize, false_time: f64) -> Result<f64> {
        let world = self.world.read();
        world.check_id(i)?;
        world.check_id(j)?;
        Ok(self
            .model
            .time_to_event(world.particles(), world.boundary(), i, j, false_time)?)
    }

    /// Resolve the event between `i` and `j` at `false_time` and re-index both.
    pub fn apply_collision(&mut self, i: usize, j: usize, false_time: f64) -> Result<Collision<D>> {
        let mut world = self.world.write();
        world.check_id(i)?;
        world.check_id(j)?;
        let (particles, boundary) = world.parts_mut();
        let collision = self
            .model
            .apply_event(particles, boundary, i, j, false_time)?;
        world.relocate(i);
        world.relocate(j);
        Ok(collision)
    }

    /// Run an arbitrary pair task over all workers.
    pub fn run_pass<T>(&mut self, task: T) -> Result<AggregateResult<D>>
    where
        T: PassTask<D> + 'static,
    {
        self.dispatcher.run(&self.world, Arc::new(task))
    }

    /// Earliest predicted event per particle and overall.
    pub fn collision_search(&mut self, false_time: f64) -> Result<AggregateResult<D>> {
        let task = CollisionSearch::new(Arc::clone(&self.model), false_time);
        self.run_pass(task)
    }

    /// Total pair potential energy.
    pub fn energy_sum(&mut self) -> Result<f64> {
        let task = EnergySum::new(Arc::clone(&self.model));
        Ok(self.run_pass(task)?.energy)
    }

    pub fn set_thread_count(&mut self, threads: usize) -> Result<()> {
        self.dispatcher.set_thread_count(threads)?;
        self.config.threads = threads;
        Ok(())
    }

    pub fn thread_count(&self) -> usize {
        self.dispatcher.thread_count()
    }

    /// Stop the worker pool. Passes fail until `set_thread_count` restarts it.
    pub fn shutdown(&mut self) {
        self.dispatcher.shutdown();
    }

    /// Mutate particles in place (drift, thermostat, ...) and resync the index.
    pub fn update_particles<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut ParticleArena<D>) -> R,
    {
        let mut world = self.world.write();
        let out = f(world.parts_mut().0);
        let moved = world.sync_all();
        debug!(moved, generation = world.generation(), "particles updated");
        out
    }

    /// Add a particle, re-gridding first if it raises the range.
    ///
    /// The first particle of an empty world sets the range outright.
    /// Nothing changes if the new range does not fit the box.
    pub fn add_particle(&mut self, p: Particle<D>) -> Result<usize> {
        let mut world = self.world.write();
        let needed = self.model.range(p.diameter);
        let empty = world.particles().is_empty();
        if world.range().is_some_and(|r| empty || needed > r) {
            world.set_range(needed)?;
        }
        world.add_particle(p)
    }

    /// Remove particle `i`; the last particle takes over id `i`.
    pub fn remove_particle(&mut self, i: usize) -> Result<(Particle<D>, Option<usize>)> {
        self.world.write().remove_particle(i)
    }
}

/// Interaction range to grid for. An empty arena has no diameters to go
/// on, so it keeps `previous` or takes the shortest box edge.
fn grid_range<const D: usize, M: PairInteraction<D>>(
    model: &M,
    particles: &ParticleArena<D>,
    boundary: &dyn Boundary<D>,
    previous: Option<f64>,
) -> f64 {
    if !particles.is_empty() {
        return model.range(particles.max_diameter());
    }
    previous.unwrap_or_else(|| {
        boundary
            .dimensions()
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    })
}
