//! Vector arithmetic on fixed-size arrays and the box geometry service.
//!
//! The simulation box spans `[0, L_k)` on every axis `k`. Periodic axes use
//! the minimum-image convention; non-periodic axes leave separations alone.

use std::fmt;

use crate::error::{Error, Result};

/// A point or displacement in `D` dimensions.
pub type Vector<const D: usize> = [f64; D];

/// `a - b`
#[inline]
pub fn sub<const D: usize>(a: &Vector<D>, b: &Vector<D>) -> Vector<D> {
    let mut out = [0.0; D];
    for (k, o) in out.iter_mut().enumerate() {
        *o = a[k] - b[k];
    }
    out
}

/// `a + b`
#[inline]
pub fn add<const D: usize>(a: &Vector<D>, b: &Vector<D>) -> Vector<D> {
    let mut out = [0.0; D];
    for (k, o) in out.iter_mut().enumerate() {
        *o = a[k] + b[k];
    }
    out
}

/// `s * a`
#[inline]
pub fn scale<const D: usize>(a: &Vector<D>, s: f64) -> Vector<D> {
    let mut out = *a;
    out.iter_mut().for_each(|x| *x *= s);
    out
}

/// `a += s * b`
#[inline]
pub fn add_scaled<const D: usize>(a: &mut Vector<D>, s: f64, b: &Vector<D>) {
    for (ak, bk) in a.iter_mut().zip(b.iter()) {
        *ak += s * bk;
    }
}

/// Inner product.
#[inline]
pub fn dot<const D: usize>(a: &Vector<D>, b: &Vector<D>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean length.
#[inline]
pub fn norm_sq<const D: usize>(a: &Vector<D>) -> f64 {
    dot(a, a)
}

/// Box geometry consumed by the index and the pair models.
pub trait Boundary<const D: usize>: Send + Sync + fmt::Debug {
    /// Edge lengths of the box.
    fn dimensions(&self) -> Vector<D>;

    /// Which axes wrap around.
    fn periodicity(&self) -> [bool; D];

    /// Replace a separation vector by its minimum image.
    fn nearest_image(&self, dr: &mut Vector<D>);

    fn volume(&self) -> f64 {
        self.dimensions().iter().product()
    }
}

/// Axis-aligned rectangular box with per-axis periodicity.
#[derive(Debug, Clone, PartialEq)]
pub struct RectangularBox<const D: usize> {
    dimensions: Vector<D>,
    periodic: [bool; D],
}

impl<const D: usize> RectangularBox<D> {
    /// Fully periodic box.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if any edge length is non-finite or non-positive.
    pub fn periodic(dimensions: Vector<D>) -> Result<Self> {
        Self::with_periodicity(dimensions, [true; D])
    }

    pub fn with_periodicity(dimensions: Vector<D>, periodic: [bool; D]) -> Result<Self> {
        if !dimensions.iter().all(|&l| l.is_finite() && l > 0.0) {
            return Err(Error::InvalidParam(
                "box dimensions must be finite and > 0".into(),
            ));
        }
        Ok(Self {
            dimensions,
            periodic,
        })
    }
}

impl<const D: usize> Boundary<D> for RectangularBox<D> {
    fn dimensions(&self) -> Vector<D> {
        self.dimensions
    }

    fn periodicity(&self) -> [bool; D] {
        self.periodic
    }

    #[inline]
    fn nearest_image(&self, dr: &mut Vector<D>) {
        for (k, x) in dr.iter_mut().enumerate() {
            if self.periodic[k] {
                let l = self.dimensions[k];
                *x -= l * (*x / l).round();
            }
        }
    }
}
