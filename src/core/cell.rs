//! Cell index: a uniform grid over the simulation box.
//!
//! Cells are at least one interaction range wide on every axis, so every
//! pair within range sits in the same cell or in adjacent cells. Each cell
//! carries a half-stencil: the distinct adjacent cells with a higher linear id
//! ("up") and those with a lower one ("down"). Ordering by id rather than by
//! offset sign keeps the stencil exact when periodic wrap folds `+1` and `-1`
//! onto the same cell, which happens on axes with fewer than three cells.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::geometry::{Boundary, Vector};
use crate::core::particle::ParticleArena;
use crate::error::{Error, Result};

/// Linear cell id (row-major over the per-axis cell coordinates).
pub type CellId = usize;

/// Tolerance applied before rounding the last axis up in the balancing step.
const CEIL_SLACK: f64 = 1e-9;

/// Upper bound on the number of cells in one grid. Sparse boxes past this
/// get wider cells instead of more of them.
pub const MAX_CELLS: usize = 1 << 18;

/// How finely to divide the box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellTarget {
    /// Cells as small as the interaction range allows.
    MinimumSize,
    /// Roughly this many cells in total, kept close to cubic.
    Count(usize),
    /// Cells of at least this edge length.
    Size(f64),
}

impl Default for CellTarget {
    fn default() -> Self {
        CellTarget::MinimumSize
    }
}

impl CellTarget {
    pub fn validate(&self) -> Result<()> {
        match *self {
            CellTarget::MinimumSize => Ok(()),
            CellTarget::Count(0) => Err(Error::Configuration(
                "requested cell count must be > 0".into(),
            )),
            CellTarget::Count(_) => Ok(()),
            CellTarget::Size(s) if !s.is_finite() || s <= 0.0 => Err(Error::Configuration(
                "requested cell size must be finite and > 0".into(),
            )),
            CellTarget::Size(_) => Ok(()),
        }
    }
}

/// One grid cell.
#[derive(Debug, Clone)]
pub struct Cell<const D: usize> {
    coords: [usize; D],
    members: Vec<usize>,
    up: Vec<CellId>,
    down: Vec<CellId>,
}

impl<const D: usize> Cell<D> {
    /// Per-axis grid coordinates.
    pub fn coords(&self) -> &[usize; D] {
        &self.coords
    }

    /// Particle ids currently assigned to this cell.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Adjacent cells with a higher id.
    pub fn up(&self) -> &[CellId] {
        &self.up
    }

    /// Adjacent cells with a lower id.
    pub fn down(&self) -> &[CellId] {
        &self.down
    }
}

/// Spatial index mapping particles to grid cells.
#[derive(Debug, Clone)]
pub struct CellIndex<const D: usize> {
    target: CellTarget,
    range: f64,
    extents: Vector<D>,
    periodic: [bool; D],
    counts: [usize; D],
    cell_size: Vector<D>,
    cells: Vec<Cell<D>>,
    cell_of: Vec<Option<CellId>>,
}

impl<const D: usize> CellIndex<D> {
    /// Build an empty grid for `boundary` whose cells are at least `range` wide.
    ///
    /// Errors:
    /// - `Error::Configuration` for a zero cell count, a non-positive cell
    ///   size or range, or a range wider than a periodic box edge.
    pub fn build(boundary: &dyn Boundary<D>, target: CellTarget, range: f64) -> Result<Self> {
        let extents = boundary.dimensions();
        let periodic = boundary.periodicity();
        let counts = grid_counts(&extents, &periodic, target, range)?;
        let cells = make_cells(&counts, &periodic);
        debug!(?counts, range, cells = cells.len(), "built cell index");
        Ok(Self {
            target,
            range,
            extents,
            periodic,
            counts,
            cell_size: cell_size(&extents, &counts),
            cells,
            cell_of: Vec::new(),
        })
    }

    /// Cell containing `position`.
    ///
    /// Periodic axes wrap; non-periodic axes clamp to the edge cells.
    #[inline]
    pub fn assign(&self, position: &Vector<D>) -> CellId {
        let mut id = 0usize;
        for k in 0..D {
            let n = self.counts[k];
            let c = (position[k] / self.cell_size[k]).floor() as i64;
            let c = if self.periodic[k] {
                c.rem_euclid(n as i64) as usize
            } else {
                c.clamp(0, n as i64 - 1) as usize
            };
            id = id * n + c;
        }
        id
    }

    /// Reassign every particle from scratch. Members are listed in id order.
    pub fn assign_all(&mut self, particles: &ParticleArena<D>) {
        for cell in &mut self.cells {
            cell.members.clear();
        }
        self.cell_of.clear();
        self.cell_of.reserve(particles.len());
        for (i, r) in particles.positions().iter().enumerate() {
            let c = self.assign(r);
            self.cells[c].members.push(i);
            self.cell_of.push(Some(c));
        }
    }

    /// Move particle `i` to the cell matching `position`.
    ///
    /// Returns `true` when the membership changed.
    pub fn relocate(&mut self, i: usize, position: &Vector<D>) -> bool {
        let new = self.assign(position);
        if i >= self.cell_of.len() {
            self.cell_of.resize(i + 1, None);
        }
        match self.cell_of[i] {
            Some(old) if old == new => return false,
            Some(old) => {
                let members = &mut self.cells[old].members;
                if let Some(pos) = members.iter().position(|&m| m == i) {
                    members.swap_remove(pos);
                }
            }
            None => {}
        }
        self.cells[new].members.push(i);
        self.cell_of[i] = Some(new);
        true
    }

    /// Adapt the grid to a new box shape and refresh membership.
    ///
    /// Cell storage and stencils are rebuilt only when the per-axis counts
    /// change; the return value says whether that happened.
    pub fn resize(
        &mut self,
        boundary: &dyn Boundary<D>,
        particles: &ParticleArena<D>,
    ) -> Result<bool> {
        let extents = boundary.dimensions();
        let periodic = boundary.periodicity();
        let counts = grid_counts(&extents, &periodic, self.target, self.range)?;
        let rebuilt = counts != self.counts || periodic != self.periodic;
        self.extents = extents;
        self.periodic = periodic;
        self.cell_size = cell_size(&extents, &counts);
        if rebuilt {
            self.counts = counts;
            self.cells = make_cells(&counts, &periodic);
            debug!(?counts, "cell grid rebuilt after resize");
        }
        self.assign_all(particles);
        Ok(rebuilt)
    }

    /// Cell currently holding particle `i`, if it has been assigned.
    #[inline]
    pub fn cell_of(&self, i: usize) -> Option<CellId> {
        self.cell_of.get(i).copied().flatten()
    }

    /// Cell `id`. Panics if `id` is out of range.
    #[inline]
    pub fn cell(&self, id: CellId) -> &Cell<D> {
        &self.cells[id]
    }

    /// All cells in id order.
    pub fn cells(&self) -> &[Cell<D>] {
        &self.cells
    }

    /// Particle ids in cell `id`.
    #[inline]
    pub fn members(&self, id: CellId) -> &[usize] {
        &self.cells[id].members
    }

    /// Adjacent cells with a higher id.
    pub fn up_cells(&self, id: CellId) -> &[CellId] {
        &self.cells[id].up
    }

    /// Adjacent cells with a lower id.
    pub fn down_cells(&self, id: CellId) -> &[CellId] {
        &self.cells[id].down
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells per axis.
    pub fn counts(&self) -> [usize; D] {
        self.counts
    }

    /// Cell edge length per axis.
    pub fn cell_size(&self) -> Vector<D> {
        self.cell_size
    }

    /// Interaction range the grid was sized for.
    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn target(&self) -> CellTarget {
        self.target
    }
}

/// Per-axis cell counts close to `target` cells in total, keeping cells near cubic.
///
/// Axes are fixed smallest extent first: each gets
/// `round(extent * (cells_left / product_of_open_extents)^(1 / open_axes))`
/// cells; the last axis rounds up so the product does not fall short.
pub fn balanced_counts<const D: usize>(extents: &Vector<D>, target: usize) -> [usize; D] {
    let mut counts = [1usize; D];
    let mut open = [true; D];
    let mut cells_left = target as f64;
    for axes_left in (1..=D).rev() {
        let Some(k) = (0..D)
            .filter(|&k| open[k])
            .min_by(|&a, &b| extents[a].total_cmp(&extents[b]))
        else {
            break;
        };
        let product: f64 = (0..D).filter(|&a| open[a]).map(|a| extents[a]).product();
        let ideal = extents[k] * (cells_left / product).powf(1.0 / axes_left as f64);
        let n = if axes_left == 1 {
            (ideal - CEIL_SLACK).ceil()
        } else {
            ideal.round()
        };
        let n = if n.is_finite() { n.max(1.0) as usize } else { 1 };
        counts[k] = n;
        cells_left /= n as f64;
        open[k] = false;
    }
    counts
}

fn grid_counts<const D: usize>(
    extents: &Vector<D>,
    periodic: &[bool; D],
    target: CellTarget,
    range: f64,
) -> Result<[usize; D]> {
    target.validate()?;
    if !range.is_finite() || range <= 0.0 {
        return Err(Error::Configuration(format!(
            "interaction range must be finite and > 0, got {range}"
        )));
    }
    for k in 0..D {
        if periodic[k] && range > extents[k] {
            return Err(Error::Configuration(format!(
                "interaction range {range} exceeds periodic box edge {} on axis {k}",
                extents[k]
            )));
        }
    }

    let mut counts = match target {
        CellTarget::MinimumSize => [usize::MAX; D],
        CellTarget::Count(n) => balanced_counts(extents, n),
        CellTarget::Size(s) => {
            let mut c = [1usize; D];
            for (k, ck) in c.iter_mut().enumerate() {
                *ck = ((extents[k] / s).floor() as usize).max(1);
            }
            c
        }
    };
    for (k, ck) in counts.iter_mut().enumerate() {
        let widest = ((extents[k] / range).floor() as usize).max(1);
        *ck = (*ck).min(widest).max(1);
    }
    let total = counts.iter().try_fold(1usize, |acc, &c| acc.checked_mul(c));
    if total.map_or(true, |t| t > MAX_CELLS) {
        let capped = balanced_counts(extents, MAX_CELLS);
        for (ck, cap) in counts.iter_mut().zip(capped) {
            *ck = (*ck).min(cap).max(1);
        }
        debug!(?counts, requested = ?total, "cell count capped");
    }
    Ok(counts)
}

fn cell_size<const D: usize>(extents: &Vector<D>, counts: &[usize; D]) -> Vector<D> {
    let mut size = [0.0; D];
    for k in 0..D {
        size[k] = extents[k] / counts[k] as f64;
    }
    size
}

fn make_cells<const D: usize>(counts: &[usize; D], periodic: &[bool; D]) -> Vec<Cell<D>> {
    let total: usize = counts.iter().product();
    let offsets = stencil_offsets::<D>();
    let mut cells = Vec::with_capacity(total);
    let mut adjacent = Vec::with_capacity(offsets.len());
    for id in 0..total {
        let coords = unravel(id, counts);
        adjacent.clear();
        'offsets: for offset in &offsets {
            let mut nid = 0usize;
            for k in 0..D {
                let n = counts[k] as i64;
                let c = coords[k] as i64 + offset[k];
                let c = if periodic[k] {
                    c.rem_euclid(n)
                } else if (0..n).contains(&c) {
                    c
                } else {
                    continue 'offsets;
                };
                nid = nid * counts[k] + c as usize;
            }
            if nid != id {
                adjacent.push(nid);
            }
        }
        adjacent.sort_unstable();
        adjacent.dedup();
        let split = adjacent.partition_point(|&n| n < id);
        cells.push(Cell {
            coords,
            members: Vec::new(),
            down: adjacent[..split].to_vec(),
            up: adjacent[split..].to_vec(),
        });
    }
    cells
}

/// All offsets in `{-1, 0, 1}^D` except the origin.
fn stencil_offsets<const D: usize>() -> Vec<[i64; D]> {
    let total = 3usize.pow(D as u32);
    let mut out = Vec::with_capacity(total - 1);
    for code in 0..total {
        let mut offset = [0i64; D];
        let mut rest = code;
        for o in offset.iter_mut() {
            *o = (rest % 3) as i64 - 1;
            rest /= 3;
        }
        if offset.iter().any(|&o| o != 0) {
            out.push(offset);
        }
    }
    out
}

fn unravel<const D: usize>(mut id: usize, counts: &[usize; D]) -> [usize; D] {
    let mut coords = [0usize; D];
    for k in (0..D).rev() {
        coords[k] = id % counts[k];
        id /= counts[k];
    }
    coords
}
