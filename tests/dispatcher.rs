use std::ops::Range;
use std::sync::Arc;

use gascell::core::geometry::{norm_sq, sub};
use gascell::core::{
    Boundary, CellTarget, Collision, Particle, ParticleArena, RectangularBox, World,
};
use gascell::parallel::{
    ParallelDispatcher, PartitionStrategy, PassAccumulator, PassContext, PassTask, SliceDomain,
};
use gascell::{Error, Result};
use parking_lot::RwLock;

/// Sums |dr|² and dr⊗dr over every candidate pair.
struct SeparationMoments;

impl PassTask<3> for SeparationMoments {
    fn name(&self) -> &str {
        "separation_moments"
    }

    fn visit(
        &self,
        ctx: &PassContext<'_, 3>,
        i: usize,
        j: usize,
        acc: &mut PassAccumulator<3>,
    ) -> Result<()> {
        let mut dr = sub(ctx.particles.position(j), ctx.particles.position(i));
        ctx.boundary.nearest_image(&mut dr);
        let r2 = norm_sq(&dr);
        acc.count_pair();
        acc.add_energy(r2);
        acc.add_collision(&Collision {
            virial: r2,
            virial_over_r2: 1.0,
            dr,
            energy_change: 0.0,
        });
        acc.add_impulse(i, 1.0, &dr);
        acc.add_impulse(j, -1.0, &dr);
        Ok(())
    }
}

/// Fails on any target in `targets`, by error or by panic.
struct Faulty {
    targets: Range<usize>,
    panic: bool,
}

impl PassTask<3> for Faulty {
    fn visit(
        &self,
        _ctx: &PassContext<'_, 3>,
        i: usize,
        _j: usize,
        acc: &mut PassAccumulator<3>,
    ) -> Result<()> {
        if self.targets.contains(&i) {
            if self.panic {
                panic!("bad target {i}");
            }
            return Err(Error::InvalidParam(format!("bad target {i}")));
        }
        acc.count_pair();
        Ok(())
    }
}

fn shared_world() -> Result<Arc<RwLock<World<3>>>> {
    let boundary = RectangularBox::periodic([9.0, 9.0, 9.0])?;
    let particles = ParticleArena::random_gas(300, &boundary, 0.6, 1.0, Some(2024))?;
    let world = World::with_cells(particles, Box::new(boundary), CellTarget::MinimumSize, 1.5)?;
    Ok(Arc::new(RwLock::new(world)))
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

#[test]
fn aggregates_do_not_depend_on_thread_count() -> Result<()> {
    let world = shared_world()?;
    for strategy in [PartitionStrategy::Particles, PartitionStrategy::Cells] {
        let mut results = Vec::new();
        for threads in [1, 2, 4, 8] {
            let mut d = ParallelDispatcher::new(threads, strategy)?;
            results.push(d.run(&world, Arc::new(SeparationMoments))?);
        }
        let base = &results[0];
        assert!(base.pair_count > 0);
        for result in &results[1..] {
            assert_eq!(result.pair_count, base.pair_count);
            assert!(close(result.energy, base.energy));
            assert!(close(result.virial, base.virial));
            for a in 0..3 {
                for b in 0..3 {
                    assert!(close(result.virial_tensor[a][b], base.virial_tensor[a][b]));
                }
            }
            assert_eq!(result.impulses.len(), base.impulses.len());
            for (x, y) in result.impulses.iter().zip(&base.impulses) {
                for k in 0..3 {
                    assert!(close(x[k], y[k]));
                }
            }
        }
    }
    Ok(())
}

#[test]
fn slices_cover_domain_exactly() -> Result<()> {
    let world = shared_world()?;
    let (particles, cells) = {
        let w = world.read();
        (w.particles().len(), w.neighbors().domain_len())
    };
    for (strategy, len) in [
        (PartitionStrategy::Particles, particles),
        (PartitionStrategy::Cells, cells),
    ] {
        for threads in [1, 2, 3, 5, 7] {
            let mut d = ParallelDispatcher::new(threads, strategy)?;
            d.run(&world, Arc::new(SeparationMoments))?;
            let mut covered = vec![0u8; len];
            for slice in d.slices() {
                match (strategy, slice) {
                    (PartitionStrategy::Particles, SliceDomain::Particles(_))
                    | (PartitionStrategy::Cells, SliceDomain::Cells(_)) => {}
                    _ => panic!("slice kind does not match strategy"),
                }
                for k in slice.range().clone() {
                    covered[k] += 1;
                }
            }
            assert_eq!(d.slices().len(), threads);
            assert!(covered.iter().all(|&c| c == 1), "{threads} threads");
        }
    }
    Ok(())
}

#[test]
fn worker_failures_are_reported_and_pool_recovers() -> Result<()> {
    let world = shared_world()?;
    let mut d = ParallelDispatcher::new(4, PartitionStrategy::Particles)?;
    let expected = d.run(&world, Arc::new(SeparationMoments))?.pair_count;

    // Four workers over 300 particles own 75 targets each.
    for panic in [false, true] {
        let err = d
            .run(&world, Arc::new(Faulty { targets: 0..75, panic }))
            .unwrap_err();
        match err {
            Error::WorkerFailure { worker, message } => {
                assert_eq!(worker, 0);
                assert!(message.contains("bad target"), "{message}");
            }
            other => panic!("unexpected error {other}"),
        }
        let err = d
            .run(&world, Arc::new(Faulty { targets: 150..300, panic }))
            .unwrap_err();
        assert!(matches!(err, Error::WorkerFailure { worker: 2, .. }));
    }

    assert_eq!(d.run(&world, Arc::new(SeparationMoments))?.pair_count, expected);
    Ok(())
}

#[test]
fn cache_follows_world_changes() -> Result<()> {
    let world = shared_world()?;
    let mut d = ParallelDispatcher::new(2, PartitionStrategy::Cells)?;
    let before = d.run(&world, Arc::new(SeparationMoments))?;
    {
        let mut w = world.write();
        w.parts_mut().0.drift(3.0);
        w.sync_all();
    }
    let after = d.run(&world, Arc::new(SeparationMoments))?;

    let mut fresh = ParallelDispatcher::new(3, PartitionStrategy::Particles)?;
    let reference = fresh.run(&world, Arc::new(SeparationMoments))?;
    assert_eq!(after.pair_count, reference.pair_count);
    assert!(close(after.energy, reference.energy));
    assert!(before.pair_count > 0);
    Ok(())
}

fn world_at(positions: &[[f64; 3]]) -> Result<Arc<RwLock<World<3>>>> {
    let boundary = RectangularBox::periodic([10.0, 10.0, 10.0])?;
    let mut particles = ParticleArena::new();
    for &r in positions {
        particles.push(Particle::new(r, [0.0; 3], 1.0, 1.0)?);
    }
    let world = World::with_cells(particles, Box::new(boundary), CellTarget::MinimumSize, 1.0)?;
    Ok(Arc::new(RwLock::new(world)))
}

#[test]
fn cache_is_not_shared_between_worlds() -> Result<()> {
    let touching = world_at(&[[1.0, 1.0, 1.0], [1.5, 1.0, 1.0]])?;
    let apart = world_at(&[[1.0, 1.0, 1.0], [6.0, 6.0, 6.0]])?;
    let single = world_at(&[[1.0, 1.0, 1.0]])?;

    for strategy in [PartitionStrategy::Particles, PartitionStrategy::Cells] {
        let mut d = ParallelDispatcher::new(1, strategy)?;
        assert_eq!(d.run(&touching, Arc::new(SeparationMoments))?.pair_count, 1);
        // Both worlds are still at generation 0.
        assert_eq!(d.run(&apart, Arc::new(SeparationMoments))?.pair_count, 0);
        assert_eq!(d.run(&touching, Arc::new(SeparationMoments))?.pair_count, 1);
        assert_eq!(d.run(&single, Arc::new(SeparationMoments))?.pair_count, 0);
    }
    Ok(())
}
