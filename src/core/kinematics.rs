//! Pair interaction models: event prediction and response.
//!
//! All models share the same conventions. `false_time` is the offset from
//! the stored positions to the instant the pair is examined, so a caller
//! may resolve several events inside one integrator step without drifting
//! every particle first. Particle `j` is measured relative to particle `i`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::geometry::{add_scaled, dot, norm_sq, sub, Boundary, Vector};
use crate::core::particle::ParticleArena;
use crate::error::NumericAnomaly;

/// Default overlap tolerance factor for [`OverlapPolicy::Ignore`].
pub const DEFAULT_OVERLAP_EPSILON: f64 = 0.001;

/// Outcome of one resolved pair event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision<const D: usize> {
    /// Impulse projected on the separation, `reduced_mass * dr·dv'` style.
    pub virial: f64,
    /// `virial / |dr|²`, the scale applied to `dr` to get the impulse.
    pub virial_over_r2: f64,
    /// Minimum-image separation at the event, `j` relative to `i`.
    pub dr: Vector<D>,
    /// Change in pair potential energy caused by the event.
    pub energy_change: f64,
}

impl<const D: usize> Collision<D> {
    fn none(dr: Vector<D>) -> Self {
        Self {
            virial: 0.0,
            virial_over_r2: 0.0,
            dr,
            energy_change: 0.0,
        }
    }

    /// Outer product contribution `(virial/|dr|²)·dr⊗dr`.
    pub fn virial_tensor(&self) -> [[f64; D]; D] {
        let mut out = [[0.0; D]; D];
        for (a, row) in out.iter_mut().enumerate() {
            for (b, cell) in row.iter_mut().enumerate() {
                *cell = self.virial_over_r2 * self.dr[a] * self.dr[b];
            }
        }
        out
    }
}

/// How a pair that already overlaps at `false_time` is treated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Report the overlap as a negative collision time (a numeric anomaly).
    Strict,
    /// Schedule a collision `epsilon·|dr|/|dv|` after `false_time`.
    Ignore { epsilon: f64 },
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        OverlapPolicy::Ignore {
            epsilon: DEFAULT_OVERLAP_EPSILON,
        }
    }
}

impl OverlapPolicy {
    /// Time to return for an overlapping pair, if the policy handles it.
    pub(crate) fn overlap_time(&self, false_time: f64, r2: f64, v2: f64) -> Option<f64> {
        match *self {
            OverlapPolicy::Strict => None,
            OverlapPolicy::Ignore { epsilon } => Some(false_time + epsilon * (r2 / v2).sqrt()),
        }
    }
}

/// A short-range pair model with discrete events.
///
/// Implementations must be pure functions of the particle state so workers
/// can share one model behind an `Arc`.
pub trait PairInteraction<const D: usize>: Send + Sync + fmt::Debug {
    /// Interaction cutoff for the largest particle diameter present.
    fn range(&self, max_diameter: f64) -> f64;

    /// Absolute time (`false_time` included) of the next event for `(i, j)`,
    /// or `f64::INFINITY` if there is none.
    fn time_to_event(
        &self,
        particles: &ParticleArena<D>,
        boundary: &dyn Boundary<D>,
        i: usize,
        j: usize,
        false_time: f64,
    ) -> Result<f64, NumericAnomaly>;

    /// Resolve the event between `i` and `j` happening at `false_time`.
    fn apply_event(
        &self,
        particles: &mut ParticleArena<D>,
        boundary: &dyn Boundary<D>,
        i: usize,
        j: usize,
        false_time: f64,
    ) -> Result<Collision<D>, NumericAnomaly>;

    /// Potential energy of the pair at the stored positions.
    fn pairwise_energy(
        &self,
        particles: &ParticleArena<D>,
        boundary: &dyn Boundary<D>,
        i: usize,
        j: usize,
    ) -> f64;
}

/// Minimum-image separation and relative velocity of `j` with respect to `i`
/// at `false_time`.
pub(crate) fn separation<const D: usize>(
    particles: &ParticleArena<D>,
    boundary: &dyn Boundary<D>,
    i: usize,
    j: usize,
    false_time: f64,
) -> (Vector<D>, Vector<D>) {
    let dv = sub(particles.velocity(j), particles.velocity(i));
    let mut dr = sub(particles.position(j), particles.position(i));
    add_scaled(&mut dr, false_time, &dv);
    boundary.nearest_image(&mut dr);
    (dr, dv)
}

/// Arithmetic-mean diameter of a pair.
#[inline]
pub(crate) fn combined_diameter<const D: usize>(particles: &ParticleArena<D>, i: usize, j: usize) -> f64 {
    0.5 * (particles.diameter(i) + particles.diameter(j))
}

/// `2 / (w_i + w_j)`, or `None` when both particles are immovable.
#[inline]
pub(crate) fn reduced_mass<const D: usize>(particles: &ParticleArena<D>, i: usize, j: usize) -> Option<f64> {
    let w = particles.inv_mass(i) + particles.inv_mass(j);
    (w > 0.0).then(|| 2.0 / w)
}

/// Apply the impulse `(virial/|dr|²)·dr` and shift positions back to the
/// stored time.
pub(crate) fn apply_impulse<const D: usize>(
    particles: &mut ParticleArena<D>,
    i: usize,
    j: usize,
    dr: Vector<D>,
    r2: f64,
    virial: f64,
    false_time: f64,
) -> Collision<D> {
    let virial_over_r2 = virial / r2;
    let wi = particles.inv_mass(i);
    let wj = particles.inv_mass(j);
    add_scaled(particles.velocity_mut(i), wi * virial_over_r2, &dr);
    add_scaled(particles.velocity_mut(j), -wj * virial_over_r2, &dr);
    add_scaled(
        particles.position_mut(i),
        -false_time * wi * virial_over_r2,
        &dr,
    );
    add_scaled(
        particles.position_mut(j),
        false_time * wj * virial_over_r2,
        &dr,
    );
    Collision {
        virial,
        virial_over_r2,
        dr,
        energy_change: 0.0,
    }
}

/// Hard spheres: infinite repulsion inside the combined diameter, nothing
/// outside.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HardSphere {
    #[serde(default)]
    overlap: OverlapPolicy,
}

impl HardSphere {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlapping pairs are reported as numeric anomalies.
    pub fn strict() -> Self {
        Self {
            overlap: OverlapPolicy::Strict,
        }
    }

    pub fn with_overlap_policy(overlap: OverlapPolicy) -> Self {
        Self { overlap }
    }

    pub fn overlap_policy(&self) -> OverlapPolicy {
        self.overlap
    }
}

impl<const D: usize> PairInteraction<D> for HardSphere {
    fn range(&self, max_diameter: f64) -> f64 {
        max_diameter
    }

    fn time_to_event(
        &self,
        particles: &ParticleArena<D>,
        boundary: &dyn Boundary<D>,
        i: usize,
        j: usize,
        false_time: f64,
    ) -> Result<f64, NumericAnomaly> {
        let (dr, dv) = separation(particles, boundary, i, j, false_time);
        let b = dot(&dr, &dv);
        if b >= 0.0 {
            return Ok(f64::INFINITY);
        }
        let sigma = combined_diameter(particles, i, j);
        let r2 = norm_sq(&dr);
        let v2 = norm_sq(&dv);
        let sigma2 = sigma * sigma;
        if r2 < sigma2 {
            if let Some(t) = self.overlap.overlap_time(false_time, r2, v2) {
                return Ok(t);
            }
        }
        approach_root(b, v2, r2 - sigma2, i, j).map(|t| t.map_or(f64::INFINITY, |t| t + false_time))
    }

    fn apply_event(
        &self,
        particles: &mut ParticleArena<D>,
        boundary: &dyn Boundary<D>,
        i: usize,
        j: usize,
        false_time: f64,
    ) -> Result<Collision<D>, NumericAnomaly> {
        let (dr, dv) = separation(particles, boundary, i, j, false_time);
        let r2 = norm_sq(&dr);
        if r2 == 0.0 {
            return Err(NumericAnomaly::CoincidentCenters { i, j });
        }
        let Some(reduced) = reduced_mass(particles, i, j) else {
            return Ok(Collision::none(dr));
        };
        let virial = reduced * dot(&dr, &dv);
        Ok(apply_impulse(particles, i, j, dr, r2, virial, false_time))
    }

    fn pairwise_energy(
        &self,
        particles: &ParticleArena<D>,
        boundary: &dyn Boundary<D>,
        i: usize,
        j: usize,
    ) -> f64 {
        let (dr, _) = separation(particles, boundary, i, j, 0.0);
        let sigma = combined_diameter(particles, i, j);
        if norm_sq(&dr) < sigma * sigma {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Earliest root of `|dr + t·dv|² = |dr|² - c` for an approaching pair
/// (`b < 0`), relative to the examined instant.
///
/// `Ok(None)` when the pair misses. A negative root means the pair already
/// overlaps and is reported as an anomaly.
pub(crate) fn approach_root(
    b: f64,
    v2: f64,
    c: f64,
    i: usize,
    j: usize,
) -> Result<Option<f64>, NumericAnomaly> {
    let disc = b * b - v2 * c;
    if disc.is_nan() {
        return Err(NumericAnomaly::NanDiscriminant { i, j });
    }
    if disc <= 0.0 {
        return Ok(None);
    }
    let t = (-b - disc.sqrt()) / v2;
    if t < 0.0 {
        return Err(NumericAnomaly::NegativeTime { i, j, time: t });
    }
    Ok(Some(t))
}
