use crate::error::{Error, Result};
use ordered_float::NotNan;
use std::cmp::Ordering;

/// A predicted pair collision, ordered earliest first.
///
/// Ties on `time` are broken by the pair ids so the order is total and the
/// earliest collision of a pass does not depend on how the pass was split
/// across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionCandidate {
    pub time: NotNan<f64>,
    pub i: usize,
    pub j: usize,
}

impl CollisionCandidate {
    /// Create a candidate, validating that time is finite and non-NaN.
    pub fn new(time: f64, i: usize, j: usize) -> Result<Self> {
        if !time.is_finite() {
            return Err(Error::InvalidParam(
                "collision time must be finite and not NaN".into(),
            ));
        }
        let time = NotNan::new(time)
            .map_err(|_| Error::InvalidParam("collision time cannot be NaN".into()))?;
        Ok(Self { time, i, j })
    }

    /// Returns the raw f64 collision time.
    #[inline]
    pub fn time_f64(&self) -> f64 {
        self.time.into_inner()
    }

    /// Whether particle `k` takes part in this collision.
    #[inline]
    pub fn involves(&self, k: usize) -> bool {
        self.i == k || self.j == k
    }

    /// Keep the earlier of `current` and `self`.
    #[inline]
    pub fn keep_earliest(self, current: &mut Option<CollisionCandidate>) {
        match current {
            Some(c) if *c <= self => {}
            _ => *current = Some(self),
        }
    }
}

impl Ord for CollisionCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| (self.i, self.j).cmp(&(other.i, other.j)))
    }
}

impl PartialOrd for CollisionCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
