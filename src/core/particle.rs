use rand::{rng, rngs::StdRng, Rng, SeedableRng};

use crate::core::geometry::{norm_sq, sub, Boundary, Vector};
use crate::error::{Error, Result};

/// A hard particle as handed to the arena.
///
/// Fields:
/// - `r`: position
/// - `v`: velocity
/// - `inv_mass`: inverse mass (0 for an immovable particle)
/// - `diameter`: hard-core interaction diameter σ (> 0)
#[derive(Debug, Clone, PartialEq)]
pub struct Particle<const D: usize> {
    pub r: Vector<D>,
    pub v: Vector<D>,
    pub inv_mass: f64,
    pub diameter: f64,
}

impl<const D: usize> Particle<D> {
    /// Create a new particle after validating invariants.
    ///
    /// `mass` may be `f64::INFINITY`, which yields an immovable particle.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `diameter` or `mass` is non-positive or any component is NaN/inf.
    pub fn new(r: Vector<D>, v: Vector<D>, mass: f64, diameter: f64) -> Result<Self> {
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(Error::InvalidParam("diameter must be finite and > 0".into()));
        }
        if mass.is_nan() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be > 0".into()));
        }
        if !r.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        if !v.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        Ok(Self {
            r,
            v,
            inv_mass: 1.0 / mass,
            diameter,
        })
    }

    /// Returns the particle's kinetic energy: 1/2 m |v|^2 (0 for immovable particles).
    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        if self.inv_mass == 0.0 {
            return 0.0;
        }
        0.5 * norm_sq(&self.v) / self.inv_mass
    }
}

/// Dense particle storage: parallel arrays addressed by a small integer id.
///
/// Ids are array indices. Removal swaps the last particle into the freed
/// slot, so ids are renumbered and every index structure built on top of
/// the arena has to be rebuilt afterwards.
#[derive(Debug, Clone, Default)]
pub struct ParticleArena<const D: usize> {
    positions: Vec<Vector<D>>,
    velocities: Vec<Vector<D>>,
    inv_masses: Vec<f64>,
    diameters: Vec<f64>,
}

impl<const D: usize> ParticleArena<D> {
    /// Empty arena.
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            velocities: Vec::new(),
            inv_masses: Vec::new(),
            diameters: Vec::new(),
        }
    }

    /// Empty arena with room for `n` particles.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            positions: Vec::with_capacity(n),
            velocities: Vec::with_capacity(n),
            inv_masses: Vec::with_capacity(n),
            diameters: Vec::with_capacity(n),
        }
    }

    /// Place `num_particles` non-overlapping spheres of identical `diameter`
    /// and `mass` in a box with edge lengths `extents`.
    ///
    /// Positions come from rejection sampling within `[σ/2, L - σ/2]`;
    /// velocity components are uniform in `[-1, 1]`. Overlap is checked
    /// with the minimum image of `boundary`.
    pub fn random_gas(
        num_particles: usize,
        boundary: &dyn Boundary<D>,
        diameter: f64,
        mass: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(Error::InvalidParam("diameter must be finite and > 0".into()));
        }
        let extents = boundary.dimensions();
        if extents.iter().any(|&l| l < diameter) {
            return Err(Error::InvalidParam(
                "box must be at least one diameter wide in every dimension".into(),
            ));
        }

        let mut rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };

        let mut arena = Self::with_capacity(num_particles);
        let max_attempts = 1_000_000usize;
        let half = 0.5 * diameter;
        for id in 0..num_particles {
            let mut attempts = 0usize;
            let r = loop {
                if attempts >= max_attempts {
                    return Err(Error::InvalidParam(format!(
                        "failed to place particle {id} without overlap; try fewer particles or a smaller diameter"
                    )));
                }
                attempts += 1;
                let mut r = [0.0_f64; D];
                for (k, r_k) in r.iter_mut().enumerate() {
                    *r_k = rng.random_range(half..=extents[k] - half);
                }
                if !arena.overlaps_any(&r, diameter, boundary) {
                    break r;
                }
            };

            let mut v = [0.0_f64; D];
            v.iter_mut().for_each(|x| *x = rng.random_range(-1.0..=1.0));

            arena.push(Particle::new(r, v, mass, diameter)?);
        }
        Ok(arena)
    }

    /// Append a particle and return its id.
    pub fn push(&mut self, p: Particle<D>) -> usize {
        self.positions.push(p.r);
        self.velocities.push(p.v);
        self.inv_masses.push(p.inv_mass);
        self.diameters.push(p.diameter);
        self.positions.len() - 1
    }

    /// Remove particle `i`, moving the last particle into slot `i`.
    ///
    /// Returns the removed particle and the former id of the particle that
    /// now lives at `i` (if any moved).
    pub fn swap_remove(&mut self, i: usize) -> Result<(Particle<D>, Option<usize>)> {
        self.check(i)?;
        let last = self.len() - 1;
        let removed = Particle {
            r: self.positions.swap_remove(i),
            v: self.velocities.swap_remove(i),
            inv_mass: self.inv_masses.swap_remove(i),
            diameter: self.diameters.swap_remove(i),
        };
        let moved = (i != last).then_some(last);
        Ok((removed, moved))
    }

    /// Number of particles.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position of particle `i`. Panics if `i` is out of range.
    #[inline]
    pub fn position(&self, i: usize) -> &Vector<D> {
        &self.positions[i]
    }

    #[inline]
    pub fn velocity(&self, i: usize) -> &Vector<D> {
        &self.velocities[i]
    }

    #[inline]
    pub fn position_mut(&mut self, i: usize) -> &mut Vector<D> {
        &mut self.positions[i]
    }

    #[inline]
    pub fn velocity_mut(&mut self, i: usize) -> &mut Vector<D> {
        &mut self.velocities[i]
    }

    /// Inverse mass; 0 for an immovable particle.
    #[inline]
    pub fn inv_mass(&self, i: usize) -> f64 {
        self.inv_masses[i]
    }

    #[inline]
    pub fn diameter(&self, i: usize) -> f64 {
        self.diameters[i]
    }

    /// All positions, indexed by particle id.
    pub fn positions(&self) -> &[Vector<D>] {
        &self.positions
    }

    /// All velocities, indexed by particle id.
    pub fn velocities(&self) -> &[Vector<D>] {
        &self.velocities
    }

    /// Set position (validated as finite).
    pub fn set_position(&mut self, i: usize, r: Vector<D>) -> Result<()> {
        self.check(i)?;
        if !r.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        self.positions[i] = r;
        Ok(())
    }

    /// Set velocity (validated as finite).
    pub fn set_velocity(&mut self, i: usize, v: Vector<D>) -> Result<()> {
        self.check(i)?;
        if !v.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        self.velocities[i] = v;
        Ok(())
    }

    /// Snapshot of particle `i`.
    pub fn get(&self, i: usize) -> Option<Particle<D>> {
        (i < self.len()).then(|| Particle {
            r: self.positions[i],
            v: self.velocities[i],
            inv_mass: self.inv_masses[i],
            diameter: self.diameters[i],
        })
    }

    /// Largest diameter in the arena (0 when empty).
    pub fn max_diameter(&self) -> f64 {
        self.diameters.iter().copied().fold(0.0, f64::max)
    }

    /// Total kinetic energy (immovable particles contribute nothing).
    pub fn kinetic_energy(&self) -> f64 {
        self.velocities
            .iter()
            .zip(&self.inv_masses)
            .filter(|(_, w)| **w > 0.0)
            .map(|(v, &w)| 0.5 * norm_sq(v) / w)
            .sum()
    }

    /// Total momentum of the movable particles.
    pub fn momentum(&self) -> Vector<D> {
        let mut p = [0.0; D];
        for (v, &w) in self.velocities.iter().zip(&self.inv_masses) {
            if w > 0.0 {
                for (pk, vk) in p.iter_mut().zip(v.iter()) {
                    *pk += vk / w;
                }
            }
        }
        p
    }

    /// Advance every position by `dt` along its velocity.
    pub fn drift(&mut self, dt: f64) {
        for (r, v) in self.positions.iter_mut().zip(&self.velocities) {
            for (rk, vk) in r.iter_mut().zip(v.iter()) {
                *rk += vk * dt;
            }
        }
    }

    fn overlaps_any(&self, r: &Vector<D>, diameter: f64, boundary: &dyn Boundary<D>) -> bool {
        self.positions.iter().zip(&self.diameters).any(|(p, &d)| {
            let mut dr = sub(r, p);
            boundary.nearest_image(&mut dr);
            let sigma = 0.5 * (diameter + d);
            norm_sq(&dr) < sigma * sigma
        })
    }

    fn check(&self, i: usize) -> Result<()> {
        if i >= self.len() {
            return Err(Error::InvalidParam(format!(
                "particle id {i} out of range (len {})",
                self.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::RectangularBox;

    #[test]
    fn new_particle_ok() -> Result<()> {
        let p = Particle::new([0.0, 1.0, 2.0], [2.0, -3.0, 0.5], 2.0, 0.5)?;
        assert_eq!(p.r, [0.0, 1.0, 2.0]);
        assert_eq!(p.v, [2.0, -3.0, 0.5]);
        assert_eq!(p.diameter, 0.5);
        assert_eq!(p.inv_mass, 0.5);
        Ok(())
    }

    #[test]
    fn invalid_diameter_rejected() {
        let err = Particle::new([0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 1.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("diameter"));
    }

    #[test]
    fn invalid_mass_rejected() {
        let err = Particle::new([0.0, 0.0], [0.0, 0.0], 0.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("mass"));
    }

    #[test]
    fn infinite_mass_is_immovable() -> Result<()> {
        let p = Particle::new([0.0, 0.0], [1.0, 0.0], f64::INFINITY, 1.0)?;
        assert_eq!(p.inv_mass, 0.0);
        assert_eq!(p.kinetic_energy(), 0.0);
        Ok(())
    }

    #[test]
    fn kinetic_energy_computed() -> Result<()> {
        // v = (3,4,0), |v|^2 = 25; KE = 0.5 * m * 25
        let p = Particle::new([0.0, 0.0, 0.0], [3.0, 4.0, 0.0], 2.0, 1.0)?;
        assert!((p.kinetic_energy() - 25.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn swap_remove_reports_renumbering() -> Result<()> {
        let mut arena = ParticleArena::<2>::new();
        for k in 0..3 {
            arena.push(Particle::new([k as f64, 0.0], [0.0, 0.0], 1.0, 0.5)?);
        }
        let (removed, moved) = arena.swap_remove(0)?;
        assert_eq!(removed.r, [0.0, 0.0]);
        assert_eq!(moved, Some(2));
        assert_eq!(arena.position(0), &[2.0, 0.0]);

        let (_, moved) = arena.swap_remove(1)?;
        assert_eq!(moved, None);
        assert_eq!(arena.len(), 1);
        assert!(arena.swap_remove(5).is_err());
        Ok(())
    }

    #[test]
    fn momentum_and_energy_sum_over_particles() -> Result<()> {
        let mut arena = ParticleArena::<3>::new();
        arena.push(Particle::new([0.0; 3], [1.0, 0.0, 0.0], 2.0, 1.0)?);
        arena.push(Particle::new([2.0, 0.0, 0.0], [-1.0, 0.0, 0.0], 1.0, 1.0)?);
        assert!((arena.momentum()[0] - 1.0).abs() < 1e-12);
        assert!((arena.kinetic_energy() - 1.5).abs() < 1e-12);
        assert_eq!(arena.max_diameter(), 1.0);
        Ok(())
    }

    #[test]
    fn random_gas_has_no_overlaps() -> Result<()> {
        let boundary = RectangularBox::periodic([8.0, 8.0, 8.0])?;
        let arena = ParticleArena::random_gas(40, &boundary, 0.8, 1.0, Some(1234))?;
        assert_eq!(arena.len(), 40);
        for i in 0..arena.len() {
            for j in (i + 1)..arena.len() {
                let mut dr = sub(arena.position(j), arena.position(i));
                boundary.nearest_image(&mut dr);
                assert!(norm_sq(&dr) >= 0.64, "particles {i} and {j} overlap");
            }
        }
        Ok(())
    }

    #[test]
    fn random_gas_is_reproducible() -> Result<()> {
        let boundary = RectangularBox::periodic([5.0, 5.0])?;
        let a = ParticleArena::random_gas(10, &boundary, 0.5, 1.0, Some(7))?;
        let b = ParticleArena::random_gas(10, &boundary, 0.5, 1.0, Some(7))?;
        assert_eq!(a.positions(), b.positions());
        assert_eq!(a.velocities(), b.velocities());
        Ok(())
    }
}
