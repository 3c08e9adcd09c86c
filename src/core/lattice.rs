//! Fixed lattice where particle `k` is permanently bound to site `k`.
//!
//! Used for lattice models where a particle's "position" is its site, not a
//! point in space. Adjacency is computed once at construction and never
//! changes, so there is nothing to relocate.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which sites count as adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatticeStencil {
    /// Sites differing by one step along a single axis.
    VonNeumann,
    /// Every site in the surrounding `3^D` block.
    Moore,
}

#[derive(Debug, Clone)]
pub struct SiteLattice<const D: usize> {
    dims: [usize; D],
    periodic: [bool; D],
    stencil: LatticeStencil,
    up: Vec<Vec<usize>>,
    down: Vec<Vec<usize>>,
}

impl<const D: usize> SiteLattice<D> {
    /// Errors:
    /// - `Error::Configuration` if any axis has zero sites.
    pub fn new(dims: [usize; D], periodic: [bool; D], stencil: LatticeStencil) -> Result<Self> {
        if dims.iter().any(|&n| n == 0) {
            return Err(Error::Configuration(
                "lattice needs at least one site per axis".into(),
            ));
        }
        let total: usize = dims.iter().product();
        let mut up = Vec::with_capacity(total);
        let mut down = Vec::with_capacity(total);
        let mut adjacent = Vec::new();
        for site in 0..total {
            let coords = site_coords(site, &dims);
            adjacent.clear();
            for offset in stencil_offsets::<D>(stencil) {
                if let Some(n) = shifted(&coords, &offset, &dims, &periodic) {
                    if n != site {
                        adjacent.push(n);
                    }
                }
            }
            adjacent.sort_unstable();
            adjacent.dedup();
            let split = adjacent.partition_point(|&n| n < site);
            down.push(adjacent[..split].to_vec());
            up.push(adjacent[split..].to_vec());
        }
        Ok(Self {
            dims,
            periodic,
            stencil,
            up,
            down,
        })
    }

    /// Number of sites (and therefore of particles).
    pub fn len(&self) -> usize {
        self.up.len()
    }

    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }

    pub fn dims(&self) -> [usize; D] {
        self.dims
    }

    pub fn periodicity(&self) -> [bool; D] {
        self.periodic
    }

    pub fn stencil(&self) -> LatticeStencil {
        self.stencil
    }

    pub fn coords(&self, site: usize) -> [usize; D] {
        site_coords(site, &self.dims)
    }

    /// Adjacent sites with a higher index.
    pub fn up(&self, site: usize) -> &[usize] {
        self.up.get(site).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Adjacent sites with a lower index.
    pub fn down(&self, site: usize) -> &[usize] {
        self.down.get(site).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn stencil_offsets<const D: usize>(stencil: LatticeStencil) -> Vec<[i64; D]> {
    let mut out = Vec::new();
    match stencil {
        LatticeStencil::VonNeumann => {
            for k in 0..D {
                for step in [-1i64, 1] {
                    let mut offset = [0i64; D];
                    offset[k] = step;
                    out.push(offset);
                }
            }
        }
        LatticeStencil::Moore => {
            for code in 0..3usize.pow(D as u32) {
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
        }
    }
    out
}

fn shifted<const D: usize>(
    coords: &[usize; D],
    offset: &[i64; D],
    dims: &[usize; D],
    periodic: &[bool; D],
) -> Option<usize> {
    let mut id = 0usize;
    for k in 0..D {
        let n = dims[k] as i64;
        let c = coords[k] as i64 + offset[k];
        let c = if periodic[k] {
            c.rem_euclid(n)
        } else if (0..n).contains(&c) {
            c
        } else {
            return None;
        };
        id = id * dims[k] + c as usize;
    }
    Some(id)
}

fn site_coords<const D: usize>(mut site: usize, dims: &[usize; D]) -> [usize; D] {
    let mut coords = [0usize; D];
    for k in (0..D).rev() {
        coords[k] = site % dims[k];
        site /= dims[k];
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn von_neumann_square_lattice() -> Result<()> {
        let lattice = SiteLattice::new([4, 4], [true, true], LatticeStencil::VonNeumann)?;
        assert_eq!(lattice.len(), 16);
        for site in 0..16 {
            assert_eq!(lattice.up(site).len() + lattice.down(site).len(), 4);
        }
        // Site 0 = (0,0): neighbors (0,1)=1, (1,0)=4, (0,3)=3, (3,0)=12.
        assert_eq!(lattice.up(0), &[1, 3, 4, 12]);
        assert!(lattice.down(0).is_empty());
        Ok(())
    }

    #[test]
    fn moore_open_boundaries() -> Result<()> {
        let lattice = SiteLattice::new([3, 3], [false, false], LatticeStencil::Moore)?;
        assert_eq!(lattice.up(4).len() + lattice.down(4).len(), 8);
        assert_eq!(lattice.up(0).len() + lattice.down(0).len(), 3);
        assert_eq!(lattice.coords(5), [1, 2]);
        Ok(())
    }

    #[test]
    fn each_bond_listed_once_upward() -> Result<()> {
        let lattice = SiteLattice::new([3, 5, 2], [true, true, true], LatticeStencil::Moore)?;
        let mut bonds = std::collections::HashSet::new();
        for site in 0..lattice.len() {
            for &n in lattice.up(site) {
                assert!(bonds.insert((site, n)), "bond ({site}, {n}) listed twice");
            }
        }
        let down_total: usize = (0..lattice.len()).map(|s| lattice.down(s).len()).sum();
        assert_eq!(bonds.len(), down_total);
        Ok(())
    }

    #[test]
    fn empty_axis_rejected() {
        assert!(SiteLattice::new([0, 3], [true, true], LatticeStencil::Moore).is_err());
    }

    #[test]
    fn out_of_range_site_has_no_neighbors() -> Result<()> {
        let lattice = SiteLattice::new([2], [false], LatticeStencil::VonNeumann)?;
        assert!(lattice.up(9).is_empty());
        assert!(lattice.down(9).is_empty());
        Ok(())
    }
}
