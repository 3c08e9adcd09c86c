//! Square-well pairs: a hard core of diameter σ inside an attractive well of
//! width `λσ` and depth ε.

use serde::{Deserialize, Serialize};

use crate::core::geometry::{dot, norm_sq, Boundary};
use crate::core::kinematics::{
    apply_impulse, approach_root, combined_diameter, reduced_mass, separation, Collision,
    OverlapPolicy, PairInteraction,
};
use crate::core::particle::ParticleArena;
use crate::error::{Error, NumericAnomaly, Result};

/// Relative band around the well edge inside which a pair's side is decided
/// by its direction of motion rather than its distance.
const WELL_EDGE_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquareWell {
    lambda: f64,
    depth: f64,
    #[serde(default)]
    overlap: OverlapPolicy,
}

impl SquareWell {
    /// Errors:
    /// - `Error::InvalidParam` unless `lambda > 1` and `depth > 0`, both finite.
    pub fn new(lambda: f64, depth: f64) -> Result<Self> {
        if !lambda.is_finite() || lambda <= 1.0 {
            return Err(Error::InvalidParam("well width factor must be > 1".into()));
        }
        if !depth.is_finite() || depth <= 0.0 {
            return Err(Error::InvalidParam("well depth must be finite and > 0".into()));
        }
        Ok(Self {
            lambda,
            depth,
            overlap: OverlapPolicy::default(),
        })
    }

    pub fn with_overlap_policy(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Whether a pair at squared distance `r2` moving with `b = dr·dv` is
    /// captured by a well of squared width `w2`.
    fn inside_well(r2: f64, w2: f64, b: f64) -> bool {
        if (r2 - w2).abs() <= WELL_EDGE_TOLERANCE * w2 {
            b < 0.0
        } else {
            r2 < w2
        }
    }
}

impl<const D: usize> PairInteraction<D> for SquareWell {
    fn range(&self, max_diameter: f64) -> f64 {
        self.lambda * max_diameter
    }

    fn time_to_event(
        &self,
        particles: &ParticleArena<D>,
        boundary: &dyn Boundary<D>,
        i: usize,
        j: usize,
        false_time: f64,
    ) -> std::result::Result<f64, NumericAnomaly> {
        let (dr, dv) = separation(particles, boundary, i, j, false_time);
        let b = dot(&dr, &dv);
        let r2 = norm_sq(&dr);
        let v2 = norm_sq(&dv);
        let sigma = combined_diameter(particles, i, j);
        let sigma2 = sigma * sigma;
        let well = self.lambda * sigma;
        let w2 = well * well;

        if b.is_nan() || v2.is_nan() {
            return Err(NumericAnomaly::NanDiscriminant { i, j });
        }
        if v2 == 0.0 {
            return Ok(f64::INFINITY);
        }

        if Self::inside_well(r2, w2, b) {
            if b < 0.0 {
                if r2 < sigma2 {
                    if let Some(t) = self.overlap.overlap_time(false_time, r2, v2) {
                        return Ok(t);
                    }
                }
                if let Some(t) = approach_root(b, v2, r2 - sigma2, i, j)? {
                    return Ok(t + false_time);
                }
            }
            // Leave through the outer edge: the positive root.
            let disc = b * b - v2 * (r2 - w2);
            if disc.is_nan() {
                return Err(NumericAnomaly::NanDiscriminant { i, j });
            }
            let t = (-b + disc.max(0.0).sqrt()) / v2;
            return Ok(t.max(0.0) + false_time);
        }

        if b >= 0.0 {
            return Ok(f64::INFINITY);
        }
        Ok(approach_root(b, v2, r2 - w2, i, j)?.map_or(f64::INFINITY, |t| t + false_time))
    }

    fn apply_event(
        &self,
        particles: &mut ParticleArena<D>,
        boundary: &dyn Boundary<D>,
        i: usize,
        j: usize,
        false_time: f64,
    ) -> std::result::Result<Collision<D>, NumericAnomaly> {
        let (dr, dv) = separation(particles, boundary, i, j, false_time);
        let r2 = norm_sq(&dr);
        if r2 == 0.0 {
            return Err(NumericAnomaly::CoincidentCenters { i, j });
        }
        let b = dot(&dr, &dv);
        let sigma = combined_diameter(particles, i, j);
        let sigma2 = sigma * sigma;
        let w2 = self.lambda * self.lambda * sigma2;
        let Some(reduced) = reduced_mass(particles, i, j) else {
            return Ok(apply_impulse(particles, i, j, dr, r2, 0.0, false_time));
        };

        let at_core = (r2 - sigma2).abs() < (r2 - w2).abs();
        if at_core || b == 0.0 {
            let virial = reduced * b;
            return Ok(apply_impulse(particles, i, j, dr, r2, virial, false_time));
        }

        // Line-of-centers kinetic energy is reduced·b²/(4r²).
        let well_term = 4.0 * r2 * self.depth / reduced;
        let (virial, energy_change) = if b < 0.0 {
            (0.5 * reduced * (b + (b * b + well_term).sqrt()), -self.depth)
        } else if b * b >= well_term {
            (0.5 * reduced * (b - (b * b - well_term).sqrt()), self.depth)
        } else {
            (reduced * b, 0.0)
        };
        let mut collision = apply_impulse(particles, i, j, dr, r2, virial, false_time);
        collision.energy_change = energy_change;
        Ok(collision)
    }

    fn pairwise_energy(
        &self,
        particles: &ParticleArena<D>,
        boundary: &dyn Boundary<D>,
        i: usize,
        j: usize,
    ) -> f64 {
        let (dr, _) = separation(particles, boundary, i, j, 0.0);
        let r2 = norm_sq(&dr);
        let sigma = combined_diameter(particles, i, j);
        let well = self.lambda * sigma;
        if r2 < sigma * sigma {
            f64::INFINITY
        } else if r2 < well * well {
            -self.depth
        } else {
            0.0
        }
    }
}
