//! Pair work run by the dispatcher.

use std::sync::Arc;

use crate::core::event::CollisionCandidate;
use crate::core::geometry::Boundary;
use crate::core::kinematics::PairInteraction;
use crate::core::neighbor::Direction;
use crate::core::particle::ParticleArena;
use crate::error::Result;
use crate::parallel::accumulator::PassAccumulator;

/// Read-only view of the world handed to tasks.
#[derive(Clone, Copy)]
pub struct PassContext<'a, const D: usize> {
    pub particles: &'a ParticleArena<D>,
    pub boundary: &'a dyn Boundary<D>,
}

/// Work done for every candidate pair of a pass.
///
/// `visit` is called once per `(target, partner)` entry produced in
/// `direction()`; with the default `Up` that is once per unordered pair.
pub trait PassTask<const D: usize>: Send + Sync {
    fn name(&self) -> &str {
        "pass"
    }

    fn direction(&self) -> Direction {
        Direction::Up
    }

    fn visit(
        &self,
        ctx: &PassContext<'_, D>,
        i: usize,
        j: usize,
        acc: &mut PassAccumulator<D>,
    ) -> Result<()>;
}

/// Predicts the earliest event per particle and overall.
///
/// Bad pairs are recorded as anomalies instead of failing the pass.
#[derive(Debug)]
pub struct CollisionSearch<M> {
    model: Arc<M>,
    false_time: f64,
}

impl<M> CollisionSearch<M> {
    pub fn new(model: Arc<M>, false_time: f64) -> Self {
        Self { model, false_time }
    }
}

impl<const D: usize, M: PairInteraction<D>> PassTask<D> for CollisionSearch<M> {
    fn name(&self) -> &str {
        "collision_search"
    }

    fn visit(
        &self,
        ctx: &PassContext<'_, D>,
        i: usize,
        j: usize,
        acc: &mut PassAccumulator<D>,
    ) -> Result<()> {
        acc.count_pair();
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        match self
            .model
            .time_to_event(ctx.particles, ctx.boundary, a, b, self.false_time)
        {
            Ok(t) if t.is_finite() => acc.record_collision(CollisionCandidate::new(t, a, b)?),
            Ok(_) => {}
            Err(anomaly) => acc.record_anomaly(anomaly),
        }
        Ok(())
    }
}

/// Sums the pair potential energy.
#[derive(Debug)]
pub struct EnergySum<M> {
    model: Arc<M>,
}

impl<M> EnergySum<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self { model }
    }
}

impl<const D: usize, M: PairInteraction<D>> PassTask<D> for EnergySum<M> {
    fn name(&self) -> &str {
        "energy_sum"
    }

    fn visit(
        &self,
        ctx: &PassContext<'_, D>,
        i: usize,
        j: usize,
        acc: &mut PassAccumulator<D>,
    ) -> Result<()> {
        acc.count_pair();
        acc.add_energy(self.model.pairwise_energy(ctx.particles, ctx.boundary, i, j));
        Ok(())
    }
}
