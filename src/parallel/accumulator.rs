//! Per-worker pass results and their reduction.

use std::collections::HashMap;

use crate::core::event::CollisionCandidate;
use crate::core::geometry::{add_scaled, Vector};
use crate::core::kinematics::Collision;
use crate::error::NumericAnomaly;

/// Private sums one worker builds up during a pass.
///
/// Per-particle storage is only allocated once a task writes to it.
#[derive(Debug, Clone)]
pub struct PassAccumulator<const D: usize> {
    particles: usize,
    energy: f64,
    virial: f64,
    virial_tensor: [[f64; D]; D],
    pair_count: u64,
    impulses: Vec<Vector<D>>,
    earliest: HashMap<usize, CollisionCandidate>,
    anomalies: Vec<NumericAnomaly>,
}

impl<const D: usize> PassAccumulator<D> {
    /// Accumulator for a world of `particles` particles.
    pub fn new(particles: usize) -> Self {
        Self {
            particles,
            energy: 0.0,
            virial: 0.0,
            virial_tensor: [[0.0; D]; D],
            pair_count: 0,
            impulses: Vec::new(),
            earliest: HashMap::new(),
            anomalies: Vec::new(),
        }
    }

    pub fn add_energy(&mut self, e: f64) {
        self.energy += e;
    }

    /// Add the scalar virial and tensor of a resolved collision.
    pub fn add_collision(&mut self, collision: &Collision<D>) {
        self.virial += collision.virial;
        let tensor = collision.virial_tensor();
        for (row, add) in self.virial_tensor.iter_mut().zip(tensor.iter()) {
            for (x, y) in row.iter_mut().zip(add.iter()) {
                *x += y;
            }
        }
    }

    pub fn count_pair(&mut self) {
        self.pair_count += 1;
    }

    /// Add `scale·dv` to particle `i`'s impulse. Out-of-range ids are ignored.
    pub fn add_impulse(&mut self, i: usize, scale: f64, dv: &Vector<D>) {
        if i >= self.particles {
            return;
        }
        if self.impulses.is_empty() {
            self.impulses = vec![[0.0; D]; self.particles];
        }
        add_scaled(&mut self.impulses[i], scale, dv);
    }

    /// Keep `candidate` if it is the earliest seen for either of its particles.
    pub fn record_collision(&mut self, candidate: CollisionCandidate) {
        for k in [candidate.i, candidate.j] {
            let slot = self.earliest.entry(k).or_insert(candidate);
            if candidate < *slot {
                *slot = candidate;
            }
        }
    }

    pub fn record_anomaly(&mut self, anomaly: NumericAnomaly) {
        self.anomalies.push(anomaly);
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn pair_count(&self) -> u64 {
        self.pair_count
    }
}

/// The merged result of one pass over all workers.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult<const D: usize> {
    pub energy: f64,
    pub virial: f64,
    pub virial_tensor: [[f64; D]; D],
    pub pair_count: u64,
    /// Per-particle impulse; empty if the task recorded none.
    pub impulses: Vec<Vector<D>>,
    /// Earliest predicted collision for each particle.
    pub earliest: Vec<Option<CollisionCandidate>>,
    /// Anomalies from every worker, ordered by pair.
    pub anomalies: Vec<NumericAnomaly>,
}

impl<const D: usize> AggregateResult<D> {
    /// Reduce worker accumulators, taken in worker order.
    pub fn merge(particles: usize, parts: impl IntoIterator<Item = PassAccumulator<D>>) -> Self {
        let mut out = Self {
            energy: 0.0,
            virial: 0.0,
            virial_tensor: [[0.0; D]; D],
            pair_count: 0,
            impulses: Vec::new(),
            earliest: vec![None; particles],
            anomalies: Vec::new(),
        };
        for part in parts {
            out.energy += part.energy;
            out.virial += part.virial;
            for (row, add) in out.virial_tensor.iter_mut().zip(part.virial_tensor.iter()) {
                for (x, y) in row.iter_mut().zip(add.iter()) {
                    *x += y;
                }
            }
            out.pair_count += part.pair_count;
            if !part.impulses.is_empty() {
                if out.impulses.is_empty() {
                    out.impulses = vec![[0.0; D]; particles];
                }
                for (total, dv) in out.impulses.iter_mut().zip(&part.impulses) {
                    add_scaled(total, 1.0, dv);
                }
            }
            for (k, candidate) in part.earliest {
                if let Some(slot) = out.earliest.get_mut(k) {
                    candidate.keep_earliest(slot);
                }
            }
            out.anomalies.extend(part.anomalies);
        }
        out.anomalies.sort_by_key(|a| a.pair());
        out
    }

    /// Earliest collision over all particles.
    pub fn earliest_collision(&self) -> Option<CollisionCandidate> {
        self.earliest.iter().flatten().min().copied()
    }

    /// Earliest collision involving particle `i`.
    pub fn earliest_for(&self, i: usize) -> Option<CollisionCandidate> {
        self.earliest.get(i).copied().flatten()
    }

    pub fn has_anomalies(&self) -> bool {
        !self.anomalies.is_empty()
    }
}
