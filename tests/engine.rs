use gascell::core::{LatticeStencil, SiteLattice};
use gascell::{
    CellTarget, Engine, EngineConfig, Error, HardSphere, PairInteraction, Particle,
    ParticleArena, PartitionStrategy, RectangularBox, Result, SquareWell,
};

fn gas_engine(threads: usize, partition: PartitionStrategy) -> Result<Engine<3, HardSphere>> {
    let boundary = RectangularBox::periodic([12.0, 12.0, 12.0])?;
    let particles = ParticleArena::random_gas(200, &boundary, 1.0, 1.0, Some(99))?;
    let config = EngineConfig::default()
        .with_threads(threads)
        .with_partition(partition)
        .with_cells(CellTarget::Count(64));
    Engine::new(config, HardSphere::new(), particles, Box::new(boundary))
}

/// Earliest collision over all pairs, found the slow way.
fn brute_force_earliest(engine: &Engine<3, HardSphere>) -> Result<Option<(f64, usize, usize)>> {
    let n = engine.world().particles().len();
    let mut best: Option<(f64, usize, usize)> = None;
    for i in 0..n {
        for j in (i + 1)..n {
            let t = engine.time_to_collision(i, j, 0.0)?;
            if t.is_finite() && best.map_or(true, |(b, _, _)| t < b) {
                best = Some((t, i, j));
            }
        }
    }
    Ok(best)
}

#[test]
fn collision_search_matches_brute_force() -> Result<()> {
    for (threads, partition) in [
        (1, PartitionStrategy::Particles),
        (3, PartitionStrategy::Particles),
        (4, PartitionStrategy::Cells),
    ] {
        let mut engine = gas_engine(threads, partition)?;
        let pass = engine.collision_search(0.0)?;
        assert!(pass.anomalies.is_empty());
        let found = pass.earliest_collision().map(|c| (c.time_f64(), c.i, c.j));
        let expected = brute_force_earliest(&engine)?;
        assert_eq!(found, expected);
    }
    Ok(())
}

#[test]
fn event_loop_conserves_energy_and_keeps_index_in_sync() -> Result<()> {
    let mut engine = gas_engine(4, PartitionStrategy::Cells)?;
    let ke0 = engine.world().particles().kinetic_energy();
    for _ in 0..25 {
        let pass = engine.collision_search(0.0)?;
        let Some(next) = pass.earliest_collision() else {
            break;
        };
        engine.update_particles(|p| p.drift(next.time_f64()));
        engine.apply_collision(next.i, next.j, 0.0)?;
    }
    let world = engine.world();
    let ke1 = world.particles().kinetic_energy();
    assert!((ke1 - ke0).abs() < 1e-9 * ke0);

    let index = world
        .neighbors()
        .cells()
        .ok_or_else(|| Error::InvalidParam("expected a cell index".into()))?;
    for (i, r) in world.particles().positions().iter().enumerate() {
        assert_eq!(index.cell_of(i), Some(index.assign(r)));
    }
    Ok(())
}

#[test]
fn energy_sum_reports_overlap() -> Result<()> {
    let mut engine = gas_engine(2, PartitionStrategy::Particles)?;
    assert_eq!(engine.energy_sum()?, 0.0);
    let id = engine.add_particle(Particle::new([0.0; 3], [0.0; 3], 1.0, 1.0)?)?;
    let r = *engine.world().particles().position(0);
    engine.update_particles(|p| *p.position_mut(id) = r);
    assert_eq!(engine.energy_sum()?, f64::INFINITY);
    engine.remove_particle(id)?;
    assert_eq!(engine.energy_sum()?, 0.0);
    Ok(())
}

#[test]
fn thread_count_changes_and_shutdown() -> Result<()> {
    let mut engine = gas_engine(2, PartitionStrategy::Particles)?;
    let a = engine.collision_search(0.0)?;
    engine.set_thread_count(5)?;
    assert_eq!(engine.thread_count(), 5);
    let b = engine.collision_search(0.0)?;
    assert_eq!(a.earliest_collision(), b.earliest_collision());
    assert!(matches!(engine.set_thread_count(0), Err(Error::Configuration(_))));

    engine.shutdown();
    assert!(engine.collision_search(0.0).is_err());
    engine.set_thread_count(1)?;
    assert!(engine.collision_search(0.0).is_ok());
    Ok(())
}

#[test]
fn rebuild_and_resize() -> Result<()> {
    let mut engine = gas_engine(2, PartitionStrategy::Cells)?;
    let boundary = RectangularBox::periodic([6.0, 6.0, 6.0])?;
    let particles = ParticleArena::random_gas(20, &boundary, 1.2, 1.0, Some(5))?;
    engine.rebuild(particles, Box::new(boundary))?;
    assert_eq!(engine.world().particles().len(), 20);
    assert_eq!(engine.world().range(), Some(1.2));

    // Count(64) gives 4 cells per axis in both boxes, so only sizes change.
    assert!(!engine.resize(Box::new(RectangularBox::periodic([12.0, 12.0, 12.0])?))?);
    let size = engine.world().neighbors().cells().map(|c| c.cell_size());
    assert_eq!(size, Some([3.0, 3.0, 3.0]));
    let pass = engine.collision_search(0.0)?;
    assert_eq!(pass.earliest.len(), 20);

    let err = engine.resize(Box::new(RectangularBox::periodic([1.0, 12.0, 12.0])?));
    assert!(matches!(err, Err(Error::Configuration(_))));
    Ok(())
}

#[test]
fn square_well_lattice_energy() -> Result<()> {
    // 4x4 periodic lattice with spacing 1.2: nearest sites sit inside the
    // well (1.2 < 1.5), diagonal ones outside it.
    let boundary = RectangularBox::periodic([4.8, 4.8])?;
    let mut particles = ParticleArena::new();
    for a in 0..4 {
        for b in 0..4 {
            let r = [0.6 + 1.2 * a as f64, 0.6 + 1.2 * b as f64];
            particles.push(Particle::new(r, [0.0; 2], 1.0, 1.0)?);
        }
    }
    let lattice = SiteLattice::new([4, 4], [true, true], LatticeStencil::VonNeumann)?;
    let well = SquareWell::new(1.5, 0.5)?;
    assert_eq!(PairInteraction::<2>::range(&well, 1.0), 1.5);
    let mut engine = Engine::with_lattice(
        EngineConfig::default().with_threads(3).with_partition(PartitionStrategy::Cells),
        well,
        particles,
        Box::new(boundary),
        lattice,
    )?;
    // 16 sites x 4 bonds / 2.
    assert!((engine.energy_sum()? + 32.0 * 0.5).abs() < 1e-12);
    assert!(engine
        .add_particle(Particle::new([0.0; 2], [0.0; 2], 1.0, 1.0)?)
        .is_err());
    Ok(())
}

#[test]
fn config_deserializes_from_toml() -> Result<()> {
    let config: EngineConfig = toml::from_str(
        r#"
        threads = 3
        partition = "cells"
        cells = { count = 27 }
        "#,
    )
    .map_err(|e| Error::Configuration(e.to_string()))?;
    assert_eq!(config.threads, 3);
    assert_eq!(config.partition, PartitionStrategy::Cells);
    assert_eq!(config.cells, CellTarget::Count(27));

    let partial: EngineConfig =
        toml::from_str("cells = \"minimum_size\"").map_err(|e| Error::Configuration(e.to_string()))?;
    assert!(partial.threads >= 1);
    assert_eq!(partial.cells, CellTarget::MinimumSize);
    Ok(())
}

#[test]
fn rejected_particle_does_not_enter_the_world() -> Result<()> {
    let mut engine = gas_engine(2, PartitionStrategy::Cells)?;
    let before = engine.collision_search(0.0)?;
    let huge = Particle::new([6.0, 6.0, 6.0], [0.0; 3], 1.0, 13.0)?;
    assert!(matches!(engine.add_particle(huge), Err(Error::Configuration(_))));
    assert_eq!(engine.world().particles().len(), 200);
    assert_eq!(engine.world().range(), Some(1.0));

    let after = engine.collision_search(0.0)?;
    assert_eq!(after.pair_count, before.pair_count);
    let expected = brute_force_earliest(&engine)?;
    let found = after.earliest_collision().map(|c| (c.time_f64(), c.i, c.j));
    assert_eq!(found, expected);
    Ok(())
}

#[test]
fn engine_starts_from_an_empty_box() -> Result<()> {
    let boundary = RectangularBox::periodic([12.0, 12.0, 12.0])?;
    let mut engine = Engine::new(
        EngineConfig::default().with_threads(3),
        HardSphere::new(),
        ParticleArena::new(),
        Box::new(boundary),
    )?;
    assert_eq!(engine.energy_sum()?, 0.0);
    engine.add_particle(Particle::new([1.0, 1.0, 1.0], [1.0, 0.0, 0.0], 1.0, 1.0)?)?;
    engine.add_particle(Particle::new([4.0, 1.0, 1.0], [-1.0, 0.0, 0.0], 1.0, 1.0)?)?;
    assert_eq!(engine.world().range(), Some(1.0));
    let next = engine.collision_search(0.0)?.earliest_collision();
    assert_eq!(next.map(|c| (c.i, c.j)), Some((0, 1)));
    assert!(next.is_some_and(|c| (c.time_f64() - 1.0).abs() < 1e-12));
    Ok(())
}
